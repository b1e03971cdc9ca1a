//! Probe execution
//!
//! Sends frames over an open transport one at a time and records exactly
//! one [`ProbeResult`] per frame sent. Transport failures are contained to
//! the probe they happened in. The executor knows nothing about baud rates
//! beyond tagging results with the transport's.

use super::cancel::ScanControl;
use super::frame::CommandFrame;
use super::session::{ProbeFailure, ProbeResult, ProbeStage, ScanSession};
use super::transport::Transport;
use chrono::Local;
use std::time::Duration;

/// Default pause between write and read
pub const DEFAULT_PER_FRAME_DELAY: Duration = Duration::from_millis(150);

/// Default settle window for full scans
pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(500);

/// Drives a transport through a list of frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeExecutor {
    per_frame_delay: Duration,
    settle_window: Duration,
}

impl Default for ProbeExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_PER_FRAME_DELAY, DEFAULT_SETTLE_WINDOW)
    }
}

impl ProbeExecutor {
    /// Executor waiting `per_frame_delay` after each write, then reading for
    /// up to `settle_window`
    pub fn new(per_frame_delay: Duration, settle_window: Duration) -> Self {
        Self {
            per_frame_delay,
            settle_window,
        }
    }

    /// Pause between write and read
    pub fn per_frame_delay(&self) -> Duration {
        self.per_frame_delay
    }

    /// Longest time a read may take
    pub fn settle_window(&self) -> Duration {
        self.settle_window
    }

    /// Same delay, different settle window
    #[must_use]
    pub fn with_settle_window(self, settle_window: Duration) -> Self {
        Self {
            settle_window,
            ..self
        }
    }

    /// Send every frame and collect the results.
    ///
    /// Stops early only when `control` is cancelled; the cancellation check
    /// runs before each frame.
    pub async fn run(
        &self,
        transport: &mut dyn Transport,
        frames: &[CommandFrame],
        control: &ScanControl,
    ) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(frames.len());
        for frame in frames {
            if control.is_cancelled() {
                tracing::info!(sent = results.len(), total = frames.len(), "Probe run cancelled");
                break;
            }
            let (result, interrupted) = self.probe(transport, frame, control).await;
            results.push(result);
            if interrupted {
                break;
            }
        }
        results
    }

    /// Like [`run`](Self::run), appending straight into `session`.
    /// Returns the number of results that carried a response.
    pub async fn run_into(
        &self,
        transport: &mut dyn Transport,
        frames: &[CommandFrame],
        session: &mut ScanSession,
        control: &ScanControl,
    ) -> usize {
        let results = self.run(transport, frames, control).await;
        let responses = results.iter().filter(|r| r.has_response()).count();
        for result in results {
            session.record(result);
        }
        responses
    }

    async fn probe(
        &self,
        transport: &mut dyn Transport,
        frame: &CommandFrame,
        control: &ScanControl,
    ) -> (ProbeResult, bool) {
        let baud = transport.baud_rate();
        let sent_at = Local::now();
        let failed = |stage, error: &dyn std::fmt::Display| {
            let failure = ProbeFailure::new(stage, error);
            tracing::warn!(baud, frame = %frame.to_hex(), %failure, "Probe failed");
            ProbeResult::failed(frame.clone(), baud, sent_at, failure)
        };

        if let Err(e) = transport.reset_buffers() {
            return (failed(ProbeStage::Reset, &e), false);
        }
        if let Err(e) = transport.write(frame.bytes()).await {
            return (failed(ProbeStage::Write, &e), false);
        }

        if !control.sleep(self.per_frame_delay).await {
            tracing::info!(baud, frame = %frame.to_hex(), "Cancelled before the response was read");
            let failure = ProbeFailure::new(ProbeStage::Cancelled, "frame sent, response not read");
            return (ProbeResult::failed(frame.clone(), baud, sent_at, failure), true);
        }

        match transport.read_available(self.settle_window).await {
            Ok(response) => {
                if response.is_empty() {
                    tracing::debug!(baud, frame = %frame, "No response");
                } else {
                    tracing::info!(
                        baud,
                        frame = %frame,
                        response = %hex::encode_upper(&response),
                        "Response received"
                    );
                }
                (
                    ProbeResult::new(frame.clone(), baud, sent_at, response.to_vec()),
                    false,
                )
            }
            Err(e) => (failed(ProbeStage::Read, &e), false),
        }
    }
}
