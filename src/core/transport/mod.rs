//! Transport layer
//!
//! A [`Transport`] is the exclusive owner of one open serial connection at
//! one baud rate. [`Connector`] opens transports; the negotiator goes through
//! it so that every baud attempt gets a fresh, independently closed handle.

mod serial;

pub use serial::{list_ports, PortInfo, SerialConnector, SerialTransport};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Interval at which the input buffer is polled during a settle window
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Port already in use
    #[error("Port busy: {0}")]
    PortBusy(String),

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Used after close
    #[error("Transport closed")]
    Closed,
}

impl TransportError {
    /// True for failures that make a port/baud unreachable (as opposed to a
    /// failure of one write or read)
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::PortNotFound(_)
                | Self::PermissionDenied(_)
                | Self::PortBusy(_)
                | Self::ConnectionFailed(_)
        )
    }
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl fmt::Display for SerialParity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "N"),
            Self::Odd => write!(f, "O"),
            Self::Even => write!(f, "E"),
        }
    }
}

/// Line settings applied on every open. Passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Assert DTR after opening
    pub assert_dtr: bool,
    /// Assert RTS after opening
    pub assert_rts: bool,
    /// Pause after opening before the first write, in milliseconds
    pub post_open_delay_ms: u64,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            data_bits: 8,
            parity: SerialParity::None,
            stop_bits: 1,
            assert_dtr: true,
            assert_rts: true,
            post_open_delay_ms: 500,
        }
    }
}

impl LineSettings {
    /// Post-open pause as a duration
    pub fn post_open_delay(&self) -> Duration {
        Duration::from_millis(self.post_open_delay_ms)
    }

    /// Short form such as `8N1`
    pub fn short(&self) -> String {
        format!("{}{}{}", self.data_bits, self.parity, self.stop_bits)
    }
}

/// An open connection at a fixed baud rate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Write a whole frame
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Collect whatever arrives within the settle window. Returns early once
    /// the line has been idle for one poll interval after the first byte,
    /// and never blocks past the window. Empty on silence.
    async fn read_available(&mut self, settle_window: Duration) -> Result<Bytes, TransportError>;

    /// Discard pending input and output
    fn reset_buffers(&mut self) -> Result<(), TransportError>;

    /// Release the port. Idempotent.
    fn close(&mut self);

    /// Baud rate this transport was opened at
    fn baud_rate(&self) -> u32;

    /// Connection info string
    fn connection_info(&self) -> String;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open `port` at `baud`
    async fn open(
        &self,
        port: &str,
        baud: u32,
        line: &LineSettings,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Owns an open transport and closes it when dropped, on every exit path
pub struct TransportGuard {
    inner: Box<dyn Transport>,
}

impl TransportGuard {
    /// Take ownership of an open transport
    pub fn new(inner: Box<dyn Transport>) -> Self {
        Self { inner }
    }

    /// Borrow as a trait object
    pub fn as_dyn(&mut self) -> &mut dyn Transport {
        self.inner.as_mut()
    }
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Settle-window accumulation shared by transports.
///
/// `poll` appends whatever input is currently buffered and returns how many
/// bytes it added.
pub async fn drain_with_settle<F>(
    mut poll: F,
    poll_interval: Duration,
    settle_window: Duration,
) -> Result<Bytes, TransportError>
where
    F: FnMut(&mut BytesMut) -> Result<usize, TransportError>,
{
    let deadline = tokio::time::Instant::now() + settle_window;
    let mut buffer = BytesMut::new();

    loop {
        let added = poll(&mut buffer)?;
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }
        if added == 0 && !buffer.is_empty() {
            break;
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }

    Ok(buffer.freeze())
}
