//! Passive listening
//!
//! Opens the port and records whatever the device sends on its own, without
//! writing anything. Useful to catch devices that stream readings or print a
//! banner on power-up.

use super::cancel::ScanControl;
use super::codec::hex::serde_hex;
use super::transport::{Connector, LineSettings, Transport, TransportError, TransportGuard};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Bytes received in one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceivedChunk {
    /// Wall-clock time of arrival
    pub received_at: DateTime<Local>,
    /// Time since listening started
    pub elapsed_ms: u64,
    /// Data
    #[serde(with = "serde_hex")]
    pub data: Vec<u8>,
}

/// Everything heard at one baud rate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorCapture {
    /// Rate the port was opened at
    pub baud: u32,
    /// Chunks in arrival order
    pub chunks: Vec<ReceivedChunk>,
    /// Open or read failure that ended the capture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MonitorCapture {
    /// Total bytes heard
    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len()).sum()
    }

    /// All chunks concatenated
    pub fn data(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.data.iter().copied()).collect()
    }
}

/// Listen on an open transport for `duration`
pub async fn monitor(
    transport: &mut dyn Transport,
    duration: Duration,
    poll_interval: Duration,
    control: &ScanControl,
) -> Result<Vec<ReceivedChunk>, TransportError> {
    let start = Instant::now();
    let deadline = start + duration;
    let mut chunks = Vec::new();

    while !control.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let data = transport
            .read_available(poll_interval.min(deadline - now))
            .await?;
        if data.is_empty() {
            continue;
        }

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            baud = transport.baud_rate(),
            elapsed_ms,
            data = %hex::encode_upper(&data),
            "Data received"
        );
        chunks.push(ReceivedChunk {
            received_at: Local::now(),
            elapsed_ms,
            data: data.to_vec(),
        });
    }

    Ok(chunks)
}

/// Listen at each rate in turn. Failures are recorded per rate.
pub async fn monitor_bauds(
    connector: &dyn Connector,
    port: &str,
    line: &LineSettings,
    bauds: &[u32],
    duration: Duration,
    poll_interval: Duration,
    control: &ScanControl,
) -> Vec<MonitorCapture> {
    let mut captures = Vec::with_capacity(bauds.len());

    for &baud in bauds {
        if control.is_cancelled() {
            break;
        }
        tracing::info!(port, baud, seconds = duration.as_secs_f64(), "Listening");

        let capture = match connector.open(port, baud, line).await {
            Ok(transport) => {
                let mut transport = TransportGuard::new(transport);
                match monitor(transport.as_dyn(), duration, poll_interval, control).await {
                    Ok(chunks) => MonitorCapture {
                        baud,
                        chunks,
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(port, baud, error = %e, "Read failed while listening");
                        MonitorCapture {
                            baud,
                            chunks: Vec::new(),
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(port, baud, error = %e, "Could not open port");
                MonitorCapture {
                    baud,
                    chunks: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        captures.push(capture);
    }

    captures
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Emits `burst` at `at_ms`, silence otherwise
    struct Talker {
        baud: u32,
        at_ms: u64,
        burst: &'static [u8],
        start: Instant,
        sent: bool,
    }

    impl Talker {
        fn new(baud: u32, at_ms: u64, burst: &'static [u8]) -> Self {
            Self {
                baud,
                at_ms,
                burst,
                start: Instant::now(),
                sent: false,
            }
        }
    }

    #[async_trait]
    impl Transport for Talker {
        async fn write(&mut self, _data: &[u8]) -> Result<(), TransportError> {
            Ok(())
        }

        async fn read_available(&mut self, settle_window: Duration) -> Result<Bytes, TransportError> {
            tokio::time::sleep(settle_window).await;
            let due = self.start.elapsed() >= Duration::from_millis(self.at_ms);
            if due && !self.sent {
                self.sent = true;
                return Ok(Bytes::from_static(self.burst));
            }
            Ok(Bytes::new())
        }

        fn reset_buffers(&mut self) -> Result<(), TransportError> {
            Ok(())
        }

        fn close(&mut self) {}

        fn baud_rate(&self) -> u32 {
            self.baud
        }

        fn connection_info(&self) -> String {
            format!("talker @ {}", self.baud)
        }
    }

    struct TalkerConnector;

    #[async_trait]
    impl Connector for TalkerConnector {
        async fn open(
            &self,
            port: &str,
            baud: u32,
            _line: &LineSettings,
        ) -> Result<Box<dyn Transport>, TransportError> {
            match baud {
                9600 => Ok(Box::new(Talker::new(baud, 100, b"READY\r\n"))),
                _ => Err(TransportError::PortNotFound(port.to_string())),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_captures_burst() {
        let mut talker = Talker::new(9600, 120, &[0x00, 0x64]);
        let start = Instant::now();
        let chunks = monitor(
            &mut talker,
            Duration::from_millis(500),
            Duration::from_millis(50),
            &ScanControl::new(),
        )
        .await
        .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, vec![0x00, 0x64]);
        assert_eq!(chunks[0].elapsed_ms, 150);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_on_cancel() {
        let mut talker = Talker::new(9600, 10_000, b"never");
        let control = ScanControl::new().with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let chunks = monitor(&mut talker, Duration::from_secs(60), Duration::from_millis(50), &control)
            .await
            .unwrap();

        assert!(chunks.is_empty());
        assert!(start.elapsed() <= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_bauds_records_failures() {
        let captures = monitor_bauds(
            &TalkerConnector,
            "COM3",
            &LineSettings::default(),
            &[4800, 9600],
            Duration::from_millis(300),
            Duration::from_millis(50),
            &ScanControl::new(),
        )
        .await;

        assert_eq!(captures.len(), 2);
        assert!(captures[0].error.is_some());
        assert!(captures[0].chunks.is_empty());
        assert_eq!(captures[1].error, None);
        assert_eq!(captures[1].data(), b"READY\r\n".to_vec());
        assert_eq!(captures[1].total_bytes(), 7);
    }
}
