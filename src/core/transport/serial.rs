//! Serial port transport implementation

use super::{
    drain_with_settle, Connector, LineSettings, SerialParity, Transport, TransportError,
    DEFAULT_POLL_INTERVAL,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{Read, Write};
use std::time::Duration;

/// Serial port transport
pub struct SerialTransport {
    port_name: String,
    baud_rate: u32,
    line: LineSettings,
    poll_interval: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Open `port_name` at `baud_rate`, assert the configured modem lines
    /// and wait out the post-open delay
    pub async fn open(
        port_name: &str,
        baud_rate: u32,
        line: &LineSettings,
    ) -> Result<Self, TransportError> {
        let data_bits = match line.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match line.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match line.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let mut port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| map_open_error(port_name, e))?;

        if line.assert_dtr {
            port.write_data_terminal_ready(true)
                .map_err(|e| TransportError::Io(e.into()))?;
        }
        if line.assert_rts {
            port.write_request_to_send(true)
                .map_err(|e| TransportError::Io(e.into()))?;
        }

        tracing::debug!(port = port_name, baud_rate, line = %line.short(), "Serial port opened");

        let transport = Self {
            port_name: port_name.to_string(),
            baud_rate,
            line: line.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            port: Some(port),
        };

        if !line.post_open_delay().is_zero() {
            tokio::time::sleep(line.post_open_delay()).await;
        }

        Ok(transport)
    }

    /// Override the settle-window poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

fn map_open_error(port_name: &str, e: serialport::Error) -> TransportError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => TransportError::PortNotFound(port_name.to_string()),
        serialport::ErrorKind::Io(io_kind) => match io_kind {
            std::io::ErrorKind::NotFound => TransportError::PortNotFound(port_name.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                TransportError::PermissionDenied(port_name.to_string())
            }
            std::io::ErrorKind::AddrInUse | std::io::ErrorKind::WouldBlock => {
                TransportError::PortBusy(port_name.to_string())
            }
            _ => TransportError::ConnectionFailed(e.to_string()),
        },
        _ => TransportError::ConnectionFailed(e.to_string()),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    async fn read_available(&mut self, settle_window: Duration) -> Result<Bytes, TransportError> {
        let poll_interval = self.poll_interval;
        let port = self.port_mut()?;

        drain_with_settle(
            |buffer| {
                let pending = port
                    .bytes_to_read()
                    .map_err(|e| TransportError::Io(e.into()))? as usize;
                if pending == 0 {
                    return Ok(0);
                }
                let mut chunk = vec![0u8; pending];
                let n = match port.read(&mut chunk) {
                    Ok(n) => n,
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
                    Err(e) => return Err(TransportError::Io(e)),
                };
                buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            },
            poll_interval,
            settle_window,
        )
        .await
    }

    fn reset_buffers(&mut self) -> Result<(), TransportError> {
        self.port_mut()?
            .clear(ClearBuffer::All)
            .map_err(|e| TransportError::Io(e.into()))
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            tracing::debug!(port = %self.port_name, baud_rate = self.baud_rate, "Serial port closed");
        }
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({})",
            self.port_name,
            self.baud_rate,
            self.line.short()
        )
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Opens [`SerialTransport`]s
#[derive(Debug, Clone, Copy)]
pub struct SerialConnector {
    poll_interval: Duration,
}

impl SerialConnector {
    /// Connector with a custom settle-window poll interval
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(
        &self,
        port: &str,
        baud: u32,
        line: &LineSettings,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let transport = SerialTransport::open(port, baud, line)
            .await?
            .with_poll_interval(self.poll_interval);
        Ok(Box::new(transport))
    }
}

/// A port offered by the operating system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Device identifier passed to `open`
    pub name: String,
    /// Human description
    pub description: String,
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports().map_err(|e| TransportError::Io(e.into()))?;

    Ok(ports
        .into_iter()
        .map(|p| PortInfo {
            description: describe(&p.port_type),
            name: p.port_name,
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb
                .product
                .clone()
                .or_else(|| usb.manufacturer.clone())
                .unwrap_or_else(|| "USB serial".to_string());
            format!("{} ({:04x}:{:04x})", product, usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "Unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_mapping() {
        let e = serialport::Error::new(serialport::ErrorKind::NoDevice, "gone");
        assert!(matches!(
            map_open_error("/dev/ttyUSB9", e),
            TransportError::PortNotFound(p) if p == "/dev/ttyUSB9"
        ));

        let e = serialport::Error::new(
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "denied",
        );
        assert!(matches!(
            map_open_error("COM3", e),
            TransportError::PermissionDenied(_)
        ));

        let e = serialport::Error::new(serialport::ErrorKind::InvalidInput, "bad");
        assert!(matches!(
            map_open_error("COM3", e),
            TransportError::ConnectionFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let result = SerialTransport::open(
            "/dev/serialprobe-does-not-exist",
            9600,
            &LineSettings::default(),
        )
        .await;
        assert!(result.map(|_| ()).unwrap_err().is_connection_error());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&SerialPortType::PciPort), "PCI serial");
        assert_eq!(describe(&SerialPortType::Unknown), "Unknown");
    }
}
