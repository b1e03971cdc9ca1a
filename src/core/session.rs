//! Scan session
//!
//! A [`ScanSession`] is the append-only record of one scan run: every probe
//! result in the order it was taken, and every baud rate that was attempted.

use super::classifier::{ClassifiedResponse, Classifier};
use super::codec::hex::{self as hexfmt, serde_hex};
use super::frame::CommandFrame;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Step of a probe that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStage {
    /// Clearing buffers before the write
    Reset,
    /// Writing the frame
    Write,
    /// Reading the response
    Read,
    /// Stopped after the write, before the response was read
    Cancelled,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "reset"),
            Self::Write => write!(f, "write"),
            Self::Read => write!(f, "read"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Transport failure contained to one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeFailure {
    /// Where it failed
    pub stage: ProbeStage,
    /// Error text
    pub message: String,
}

impl ProbeFailure {
    /// Create a failure record
    pub fn new(stage: ProbeStage, error: impl fmt::Display) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            ProbeStage::Cancelled => write!(f, "cancelled: {}", self.message),
            _ => write!(f, "{} failed: {}", self.stage, self.message),
        }
    }
}

/// Outcome of sending one frame at one baud rate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    frame: CommandFrame,
    baud: u32,
    sent_at: DateTime<Local>,
    #[serde(with = "serde_hex")]
    raw_response: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    failure: Option<ProbeFailure>,
}

impl ProbeResult {
    /// A completed probe
    pub fn new(frame: CommandFrame, baud: u32, sent_at: DateTime<Local>, raw_response: Vec<u8>) -> Self {
        Self {
            frame,
            baud,
            sent_at,
            raw_response,
            failure: None,
        }
    }

    /// A probe whose transport step failed; the response is empty
    pub fn failed(frame: CommandFrame, baud: u32, sent_at: DateTime<Local>, failure: ProbeFailure) -> Self {
        Self {
            frame,
            baud,
            sent_at,
            raw_response: Vec::new(),
            failure: Some(failure),
        }
    }

    /// Frame that was sent
    pub fn frame(&self) -> &CommandFrame {
        &self.frame
    }

    /// Rate it was sent at
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Local time of the write
    pub fn sent_at(&self) -> DateTime<Local> {
        self.sent_at
    }

    /// Bytes read back, possibly empty
    pub fn raw_response(&self) -> &[u8] {
        &self.raw_response
    }

    /// Stage and error if a step failed
    pub fn failure(&self) -> Option<&ProbeFailure> {
        self.failure.as_ref()
    }

    /// Something came back
    pub fn has_response(&self) -> bool {
        !self.raw_response.is_empty()
    }

    /// The device (or a loopback) sent the frame straight back
    pub fn is_echo(&self) -> bool {
        self.has_response() && self.raw_response == self.frame.bytes()
    }

    /// Classify the response with the default heuristics
    pub fn classify(&self) -> ClassifiedResponse {
        super::classifier::classify(&self.raw_response)
    }

    /// Classify the response with custom heuristics
    pub fn classify_with(&self, classifier: &Classifier) -> ClassifiedResponse {
        classifier.classify(&self.raw_response)
    }
}

/// One attempt to open the port at a baud rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaudAttempt {
    /// Baud rate
    pub baud: u32,
    /// Open failure, if the port could not be opened at this rate
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub connection_error: Option<String>,
}

/// Per-baud counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BaudSummary {
    /// Frames sent
    pub attempts: usize,
    /// Frames that got a response
    pub successes: usize,
    /// Frames with a contained transport failure
    pub failures: usize,
}

/// Aggregate counts for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Frames sent
    pub attempts: usize,
    /// Frames that got a response
    pub successes: usize,
    /// Frames with a contained transport failure
    pub failures: usize,
    /// Breakdown by baud rate
    pub per_baud: BTreeMap<u32, BaudSummary>,
    /// Rates at which the port could not be opened
    pub unreachable_bauds: Vec<u32>,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} probes, {} responses, {} failures",
            self.attempts, self.successes, self.failures
        )?;
        for (baud, s) in &self.per_baud {
            writeln!(
                f,
                "  {:>7} baud: {} probes, {} responses, {} failures",
                baud, s.attempts, s.successes, s.failures
            )?;
        }
        for baud in &self.unreachable_bauds {
            writeln!(f, "  {:>7} baud: could not open port", baud)?;
        }
        Ok(())
    }
}

/// Flat report line for one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    /// Baud rate
    pub baud: u32,
    /// Sent bytes, spaced hex
    pub sent: String,
    /// Received bytes, spaced hex
    pub received: String,
    /// Classifier summary
    pub summary: String,
    /// Contained failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Accumulator for one scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSession {
    id: Uuid,
    port: String,
    started_at: DateTime<Local>,
    active_baud: Option<u32>,
    attempts: Vec<BaudAttempt>,
    results: Vec<ProbeResult>,
}

impl ScanSession {
    /// Empty session for `port`
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            port: port.into(),
            started_at: Local::now(),
            active_baud: None,
            attempts: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Port the session ran on
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Creation time
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Baud rate currently open, if any
    pub fn active_baud(&self) -> Option<u32> {
        self.active_baud
    }

    pub(crate) fn set_active_baud(&mut self, baud: Option<u32>) {
        self.active_baud = baud;
    }

    /// Append a probe result
    pub fn record(&mut self, result: ProbeResult) {
        self.results.push(result);
    }

    /// Append a baud attempt
    pub fn record_attempt(&mut self, attempt: BaudAttempt) {
        self.attempts.push(attempt);
    }

    /// All results in the order they were taken
    pub fn results(&self) -> &[ProbeResult] {
        &self.results
    }

    /// All baud attempts in order
    pub fn attempts(&self) -> &[BaudAttempt] {
        &self.attempts
    }

    /// Results with a non-empty response, in original order
    pub fn successful_frames(&self) -> Vec<&ProbeResult> {
        self.results.iter().filter(|r| r.has_response()).collect()
    }

    /// Aggregate counts
    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary::default();

        for attempt in &self.attempts {
            if attempt.connection_error.is_some() {
                summary.unreachable_bauds.push(attempt.baud);
            } else {
                summary.per_baud.entry(attempt.baud).or_default();
            }
        }

        for result in &self.results {
            let entry = summary.per_baud.entry(result.baud).or_default();
            entry.attempts += 1;
            summary.attempts += 1;
            if result.has_response() {
                entry.successes += 1;
                summary.successes += 1;
            }
            if result.failure.is_some() {
                entry.failures += 1;
                summary.failures += 1;
            }
        }

        summary
    }

    /// One row per probe, for the CLI report
    pub fn report_rows(&self, classifier: &Classifier) -> Vec<ReportRow> {
        self.results
            .iter()
            .map(|r| ReportRow {
                baud: r.baud,
                sent: hexfmt::spaced(r.frame.bytes()),
                received: hexfmt::spaced(&r.raw_response),
                summary: if r.is_echo() {
                    "echo".to_string()
                } else {
                    r.classify_with(classifier).summary()
                },
                failure: r.failure.as_ref().map(ToString::to_string),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> CommandFrame {
        CommandFrame::literal(bytes, "test")
    }

    fn ok(bytes: &[u8], baud: u32, response: &[u8]) -> ProbeResult {
        ProbeResult::new(frame(bytes), baud, Local::now(), response.to_vec())
    }

    #[test]
    fn test_successful_frames_preserve_order() {
        let mut session = ScanSession::new("/dev/ttyUSB0");
        session.record(ok(&[0x01], 9600, &[]));
        session.record(ok(&[0x02], 9600, &[0x10]));
        session.record(ok(&[0x03], 9600, &[]));
        session.record(ok(&[0x04], 115200, &[0x20, 0x21]));

        let found: Vec<&[u8]> = session
            .successful_frames()
            .iter()
            .map(|r| r.frame().bytes())
            .collect();
        assert_eq!(found, vec![&[0x02][..], &[0x04][..]]);
        assert_eq!(session.results().len(), 4);
    }

    #[test]
    fn test_summary_per_baud() {
        let mut session = ScanSession::new("COM3");
        session.record_attempt(BaudAttempt {
            baud: 4800,
            connection_error: Some("Port busy: COM3".into()),
        });
        session.record_attempt(BaudAttempt {
            baud: 9600,
            connection_error: None,
        });
        session.record(ok(&[0x01], 9600, &[0xAA]));
        session.record(ProbeResult::failed(
            frame(&[0x02]),
            9600,
            Local::now(),
            ProbeFailure::new(ProbeStage::Write, "broken pipe"),
        ));

        let summary = session.summary();
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(
            summary.per_baud[&9600],
            BaudSummary {
                attempts: 2,
                successes: 1,
                failures: 1
            }
        );
        assert_eq!(summary.unreachable_bauds, vec![4800]);
        assert!(summary.to_string().contains("could not open port"));
    }

    #[test]
    fn test_failed_probe_has_empty_response() {
        let result = ProbeResult::failed(
            frame(&[0x01]),
            9600,
            Local::now(),
            ProbeFailure::new(ProbeStage::Read, "timeout"),
        );
        assert!(!result.has_response());
        assert_eq!(result.failure().unwrap().to_string(), "read failed: timeout");
    }

    #[test]
    fn test_report_rows() {
        let mut session = ScanSession::new("COM3");
        session.record(ok(&[0x41, 0x54], 9600, &[0x41, 0x54]));
        session.record(ok(&[0xFA, 0xF5, 0x01], 9600, &[0xFA, 0xF5]));

        let rows = session.report_rows(&Classifier::default());
        assert_eq!(rows[0].summary, "echo");
        assert_eq!(rows[1].sent, "FA F5 01");
        assert_eq!(rows[1].received, "FA F5");
        assert_eq!(rows[1].summary, "header=FAF5");
    }

    #[test]
    fn test_session_json() {
        let mut session = ScanSession::new("COM3");
        session.record(ok(&[0x01], 9600, &[0x02]));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["port"], "COM3");
        assert_eq!(json["results"][0]["raw_response"], "02");
    }
}
