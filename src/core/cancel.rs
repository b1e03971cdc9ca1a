//! Cooperative cancellation for scans

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// External stop signal: a cancellation token plus an optional deadline.
///
/// Checked once per frame and once per baud transition. Cloning shares the
/// token, so a Ctrl-C handler can hold one clone while the scan holds another.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ScanControl {
    /// Control that only stops when cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop once `budget` has elapsed from now
    #[must_use]
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled or past the deadline
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Sleep for `duration`, returning early with `false` if cancelled
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let wake = match self.deadline {
            Some(deadline) if deadline < Instant::now() + duration => {
                tokio::select! {
                    _ = self.token.cancelled() => return false,
                    _ = tokio::time::sleep_until(deadline) => return false,
                }
            }
            _ => Instant::now() + duration,
        };

        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep_until(wake) => true,
        }
    }
}
