//! Baud rate negotiation and the full-scan driver
//!
//! The negotiator walks a prioritized list of baud rates. At each rate it
//! opens a fresh transport, runs the probe subset, and closes the transport
//! again whatever happened. Open failures are contained to their rate; only
//! running out of rates without a single response is reported upward.
//!
//! ```text
//! Idle → Connecting(b) → Probing(b) → Found(b)
//!             │               │
//!             └──→ NextBaud ←─┘ → … → Exhausted
//! ```

use super::cancel::ScanControl;
use super::executor::ProbeExecutor;
use super::frame::CommandFrame;
use super::generator::CandidateSpace;
use super::session::{BaudAttempt, ScanSession};
use super::transport::{Connector, LineSettings, TransportError, TransportGuard};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Most common rates first
pub const DEFAULT_BAUD_RATES: &[u32] = &[9600, 115200, 57600, 38400, 19200, 4800];

/// Slow rates tried only when asked for
pub const EXTENDED_BAUD_RATES: &[u32] = &[2400, 1200];

/// Default settle window for the fast pre-filter
pub const DEFAULT_NEGOTIATION_SETTLE_WINDOW: Duration = Duration::from_millis(300);

/// Negotiator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// Not started
    Idle,
    /// Opening the port
    Connecting(u32),
    /// Running the probe subset
    Probing(u32),
    /// A response was seen at this rate
    Found(u32),
    /// Moving on to the next rate
    NextBaud,
    /// Every rate tried, no response
    Exhausted,
    /// Stopped by the caller
    Cancelled,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting(b) => write!(f, "Connecting({})", b),
            Self::Probing(b) => write!(f, "Probing({})", b),
            Self::Found(b) => write!(f, "Found({})", b),
            Self::NextBaud => write!(f, "NextBaud"),
            Self::Exhausted => write!(f, "Exhausted"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Negotiation errors. Every variant hands back the session so each attempt
/// can still be reported.
#[derive(Error, Debug)]
pub enum NegotiationError {
    /// No rate produced a response
    #[error("No response at any baud rate (tried {tried:?})")]
    NoResponse {
        /// Rates attempted, in order
        tried: Vec<u32>,
        /// Everything recorded
        session: Box<ScanSession>,
    },

    /// Cancelled before a response was found
    #[error("Negotiation cancelled")]
    Cancelled {
        /// Everything recorded up to cancellation
        session: Box<ScanSession>,
    },

    /// A rate answered but the port could not be opened again for the full scan
    #[error("Could not reopen port at {baud} baud for the full scan: {source}")]
    Reopen {
        /// Rate negotiation settled on
        baud: u32,
        /// Open failure
        source: TransportError,
        /// Negotiation results plus the failed attempt
        session: Box<ScanSession>,
    },
}

impl NegotiationError {
    /// The session recorded so far
    pub fn session(&self) -> &ScanSession {
        match self {
            Self::NoResponse { session, .. }
            | Self::Cancelled { session }
            | Self::Reopen { session, .. } => &**session,
        }
    }

    /// Take the session out of the error
    pub fn into_session(self) -> ScanSession {
        match self {
            Self::NoResponse { session, .. }
            | Self::Cancelled { session }
            | Self::Reopen { session, .. } => *session,
        }
    }
}

/// Negotiation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOptions {
    /// Rates to try, in priority order
    pub baud_rates: Vec<u32>,
    /// Line settings for every open
    pub line: LineSettings,
    /// Return as soon as a round gets a response
    pub stop_on_first_response: bool,
    /// Executor used for the probe subset
    pub executor: ProbeExecutor,
}

impl Default for NegotiationOptions {
    fn default() -> Self {
        Self {
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            line: LineSettings::default(),
            stop_on_first_response: true,
            executor: ProbeExecutor::default()
                .with_settle_window(DEFAULT_NEGOTIATION_SETTLE_WINDOW),
        }
    }
}

/// Successful negotiation
#[derive(Debug, Clone)]
pub struct Negotiation {
    /// First rate that produced a response
    pub baud: u32,
    /// Everything recorded
    pub session: ScanSession,
}

/// Walks baud rates until the device answers
pub struct BaudNegotiator<'a> {
    connector: &'a dyn Connector,
    options: NegotiationOptions,
    state: NegotiationState,
    transitions: Vec<NegotiationState>,
}

impl<'a> BaudNegotiator<'a> {
    /// Negotiator in the `Idle` state
    pub fn new(connector: &'a dyn Connector, options: NegotiationOptions) -> Self {
        Self {
            connector,
            options,
            state: NegotiationState::Idle,
            transitions: vec![NegotiationState::Idle],
        }
    }

    /// Current state
    pub fn state(&self) -> NegotiationState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`
    pub fn transitions(&self) -> &[NegotiationState] {
        &self.transitions
    }

    fn transition(&mut self, next: NegotiationState) {
        tracing::debug!(from = %self.state, to = %next, "Negotiation state");
        self.state = next;
        self.transitions.push(next);
    }

    /// Run the probe subset at each rate until a response is seen or the
    /// list runs out. The transport is closed after every round.
    pub async fn negotiate(
        &mut self,
        port: &str,
        probe_subset: &[CommandFrame],
        control: &ScanControl,
    ) -> Result<Negotiation, NegotiationError> {
        let mut session = ScanSession::new(port);
        let mut tried = Vec::new();
        let mut found = None;
        let baud_rates = self.options.baud_rates.clone();

        for baud in baud_rates {
            if control.is_cancelled() {
                break;
            }

            self.transition(NegotiationState::Connecting(baud));
            tried.push(baud);
            let mut transport = match self.connector.open(port, baud, &self.options.line).await {
                Ok(t) => TransportGuard::new(t),
                Err(e) => {
                    tracing::warn!(port, baud, error = %e, "Could not open port");
                    session.record_attempt(BaudAttempt {
                        baud,
                        connection_error: Some(e.to_string()),
                    });
                    self.transition(NegotiationState::NextBaud);
                    continue;
                }
            };
            session.record_attempt(BaudAttempt {
                baud,
                connection_error: None,
            });
            session.set_active_baud(Some(baud));

            self.transition(NegotiationState::Probing(baud));
            tracing::info!(
                link = %transport.as_dyn().connection_info(),
                frames = probe_subset.len(),
                "Probing"
            );
            let responses = self
                .options
                .executor
                .run_into(transport.as_dyn(), probe_subset, &mut session, control)
                .await;

            drop(transport);
            session.set_active_baud(None);

            if responses > 0 {
                tracing::info!(baud, responses, "Device responded");
                found.get_or_insert(baud);
                if self.options.stop_on_first_response {
                    break;
                }
            }
            if !control.is_cancelled() {
                self.transition(NegotiationState::NextBaud);
            }
        }

        match found {
            Some(baud) => {
                self.transition(NegotiationState::Found(baud));
                Ok(Negotiation { baud, session })
            }
            None if control.is_cancelled() => {
                self.transition(NegotiationState::Cancelled);
                Err(NegotiationError::Cancelled {
                    session: Box::new(session),
                })
            }
            None => {
                self.transition(NegotiationState::Exhausted);
                tracing::warn!(port, ?tried, "No response at any baud rate");
                Err(NegotiationError::NoResponse {
                    tried,
                    session: Box::new(session),
                })
            }
        }
    }
}

/// Negotiate with a throwaway [`BaudNegotiator`]
pub async fn negotiate(
    connector: &dyn Connector,
    port: &str,
    options: &NegotiationOptions,
    probe_subset: &[CommandFrame],
    control: &ScanControl,
) -> Result<Negotiation, NegotiationError> {
    BaudNegotiator::new(connector, options.clone())
        .negotiate(port, probe_subset, control)
        .await
}

/// Full-scan parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Negotiation phase
    pub negotiation: NegotiationOptions,
    /// Run the whole candidate space once a rate is found
    pub full_scan: bool,
    /// Executor for the full scan (exploratory settle window)
    pub executor: ProbeExecutor,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            negotiation: NegotiationOptions::default(),
            full_scan: true,
            executor: ProbeExecutor::default(),
        }
    }
}

/// Negotiate, then run the full candidate space at the rate that answered.
/// Results of both phases land in one session. Failing to reopen the port at
/// that rate is an error; the session still comes back inside it.
pub async fn scan(
    connector: &dyn Connector,
    port: &str,
    options: &ScanOptions,
    probe_subset: &[CommandFrame],
    candidates: &CandidateSpace,
    control: &ScanControl,
) -> Result<ScanSession, NegotiationError> {
    let Negotiation { baud, mut session } =
        negotiate(connector, port, &options.negotiation, probe_subset, control).await?;

    if !options.full_scan || control.is_cancelled() {
        return Ok(session);
    }

    let mut transport = match connector.open(port, baud, &options.negotiation.line).await {
        Ok(transport) => TransportGuard::new(transport),
        Err(e) => {
            tracing::error!(port, baud, error = %e, "Could not reopen port for full scan");
            session.record_attempt(BaudAttempt {
                baud,
                connection_error: Some(e.to_string()),
            });
            return Err(NegotiationError::Reopen {
                baud,
                source: e,
                session: Box::new(session),
            });
        }
    };
    session.record_attempt(BaudAttempt {
        baud,
        connection_error: None,
    });
    session.set_active_baud(Some(baud));

    tracing::info!(
        link = %transport.as_dyn().connection_info(),
        frames = candidates.len(),
        "Starting full scan"
    );
    let responses = options
        .executor
        .run_into(transport.as_dyn(), candidates.frames(), &mut session, control)
        .await;
    session.set_active_baud(None);
    tracing::info!(baud, responses, "Full scan finished");

    Ok(session)
}

/// Full scan at a known rate, skipping negotiation
pub async fn scan_at(
    connector: &dyn Connector,
    port: &str,
    baud: u32,
    line: &LineSettings,
    frames: &[CommandFrame],
    executor: &ProbeExecutor,
    control: &ScanControl,
) -> Result<ScanSession, TransportError> {
    let mut session = ScanSession::new(port);
    let mut transport = TransportGuard::new(connector.open(port, baud, line).await?);
    session.record_attempt(BaudAttempt {
        baud,
        connection_error: None,
    });
    session.set_active_baud(Some(baud));

    tracing::info!(
        link = %transport.as_dyn().connection_info(),
        frames = frames.len(),
        "Scanning at fixed baud rate"
    );
    executor
        .run_into(transport.as_dyn(), frames, &mut session, control)
        .await;

    session.set_active_baud(None);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockTransport, Transport};
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Answers only at the listed rates; rates in `unreachable` fail to open.
    /// With `reopen_fails`, every open after the first at a rate fails.
    struct MockConnector {
        answering: Vec<u32>,
        unreachable: Vec<u32>,
        reopen_fails: bool,
        opened: Arc<Mutex<Vec<u32>>>,
        closed: Arc<Mutex<HashMap<u32, usize>>>,
    }

    impl MockConnector {
        fn new(answering: &[u32]) -> Self {
            Self {
                answering: answering.to_vec(),
                unreachable: Vec::new(),
                reopen_fails: false,
                opened: Arc::default(),
                closed: Arc::default(),
            }
        }

        fn opened(&self) -> Vec<u32> {
            self.opened.lock().clone()
        }

        fn closes(&self, baud: u32) -> usize {
            self.closed.lock().get(&baud).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn open(
            &self,
            port: &str,
            baud: u32,
            _line: &LineSettings,
        ) -> Result<Box<dyn Transport>, TransportError> {
            let reopened = {
                let mut opened = self.opened.lock();
                let seen = opened.contains(&baud);
                opened.push(baud);
                seen
            };
            if self.unreachable.contains(&baud) || (self.reopen_fails && reopened) {
                return Err(TransportError::PortBusy(port.to_string()));
            }

            let answers = self.answering.contains(&baud);
            let closed = Arc::clone(&self.closed);
            let mut mock = MockTransport::new();
            mock.expect_baud_rate().return_const(baud);
            mock.expect_connection_info()
                .times(1)
                .return_const(format!("mock @ {} baud", baud));
            mock.expect_reset_buffers().returning(|| Ok(()));
            mock.expect_write().returning(|_| Ok(()));
            mock.expect_read_available().returning(move |_| {
                Ok(if answers {
                    Bytes::from_static(&[0xFA, 0xF5, 0x00, 0x64])
                } else {
                    Bytes::new()
                })
            });
            mock.expect_close().returning(move || {
                *closed.lock().entry(baud).or_default() += 1;
            });
            Ok(Box::new(mock))
        }
    }

    fn subset() -> Vec<CommandFrame> {
        crate::core::generator::probe_subset()
    }

    fn fast_options() -> NegotiationOptions {
        NegotiationOptions {
            executor: ProbeExecutor::new(Duration::from_millis(10), Duration::from_millis(20)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_exit_on_first_response() {
        let connector = MockConnector::new(&[115200]);
        let mut negotiator = BaudNegotiator::new(&connector, fast_options());

        let negotiation = negotiator
            .negotiate("COM3", &subset(), &ScanControl::new())
            .await
            .unwrap();

        assert_eq!(negotiation.baud, 115200);
        assert_eq!(connector.opened(), vec![9600, 115200]);
        assert_eq!(connector.closes(9600), 1);
        assert_eq!(connector.closes(115200), 1);
        assert_eq!(
            negotiator.transitions(),
            &[
                NegotiationState::Idle,
                NegotiationState::Connecting(9600),
                NegotiationState::Probing(9600),
                NegotiationState::NextBaud,
                NegotiationState::Connecting(115200),
                NegotiationState::Probing(115200),
                NegotiationState::Found(115200),
            ]
        );
        assert_eq!(negotiation.session.results().len(), subset().len() * 2);
        assert_eq!(negotiation.session.active_baud(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted() {
        let connector = MockConnector::new(&[]);
        let err = negotiate(
            &connector,
            "COM3",
            &fast_options(),
            &subset(),
            &ScanControl::new(),
        )
        .await
        .unwrap_err();

        match &err {
            NegotiationError::NoResponse { tried, .. } => {
                assert_eq!(tried.as_slice(), DEFAULT_BAUD_RATES)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            err.session().results().len(),
            subset().len() * DEFAULT_BAUD_RATES.len()
        );
        for &baud in DEFAULT_BAUD_RATES {
            assert_eq!(connector.closes(baud), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failure_advances() {
        let mut connector = MockConnector::new(&[115200]);
        connector.unreachable = vec![9600];

        let negotiation = negotiate(
            &connector,
            "COM3",
            &fast_options(),
            &subset(),
            &ScanControl::new(),
        )
        .await
        .unwrap();

        assert_eq!(negotiation.baud, 115200);
        let attempts = negotiation.session.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].connection_error.is_some());
        assert_eq!(negotiation.session.summary().unreachable_bauds, vec![9600]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_early_exit_tries_all() {
        let connector = MockConnector::new(&[115200]);
        let options = NegotiationOptions {
            stop_on_first_response: false,
            ..fast_options()
        };

        let negotiation = negotiate(&connector, "COM3", &options, &subset(), &ScanControl::new())
            .await
            .unwrap();

        assert_eq!(negotiation.baud, 115200);
        assert_eq!(connector.opened(), DEFAULT_BAUD_RATES.to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start() {
        let connector = MockConnector::new(&[9600]);
        let control = ScanControl::new();
        control.cancel();

        let err = negotiate(&connector, "COM3", &fast_options(), &subset(), &control)
            .await
            .unwrap_err();

        assert!(matches!(err, NegotiationError::Cancelled { .. }));
        assert!(connector.opened().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_runs_full_space_at_found_rate() {
        let connector = MockConnector::new(&[57600]);
        let options = ScanOptions {
            negotiation: fast_options(),
            full_scan: true,
            executor: ProbeExecutor::new(Duration::from_millis(10), Duration::from_millis(20)),
        };
        let candidates = crate::core::generator::GeneratorConfig {
            payloads: vec![vec![]],
            ..Default::default()
        }
        .generate();

        let session = scan(
            &connector,
            "COM3",
            &options,
            &subset(),
            &candidates,
            &ScanControl::new(),
        )
        .await
        .unwrap();

        assert_eq!(connector.opened(), vec![9600, 115200, 57600, 57600]);
        assert_eq!(connector.closes(57600), 2);
        let summary = session.summary();
        assert_eq!(summary.per_baud[&57600].attempts, subset().len() + candidates.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_reports_reopen_failure() {
        let mut connector = MockConnector::new(&[9600]);
        connector.reopen_fails = true;
        let options = ScanOptions {
            negotiation: fast_options(),
            ..Default::default()
        };
        let candidates = crate::core::generator::GeneratorConfig::default().generate();

        let err = scan(
            &connector,
            "COM3",
            &options,
            &subset(),
            &candidates,
            &ScanControl::new(),
        )
        .await
        .unwrap_err();

        let NegotiationError::Reopen { baud, source, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(*baud, 9600);
        assert!(matches!(source, TransportError::PortBusy(_)));
        assert_eq!(connector.opened(), vec![9600, 9600]);

        let session = err.into_session();
        assert_eq!(session.results().len(), subset().len());
        assert_eq!(session.attempts().len(), 2);
        assert!(session.attempts()[1].connection_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_at_fixed_rate() {
        let connector = MockConnector::new(&[19200]);
        let frames = subset();

        let session = scan_at(
            &connector,
            "COM3",
            19200,
            &LineSettings::default(),
            &frames,
            &ProbeExecutor::new(Duration::from_millis(10), Duration::from_millis(20)),
            &ScanControl::new(),
        )
        .await
        .unwrap();

        assert_eq!(session.successful_frames().len(), frames.len());
        assert_eq!(connector.closes(19200), 1);
    }
}
