//! CLI Exit Codes
//!
//! Exit codes for scripted scans.

use crate::config::ConfigError;
use crate::core::negotiator::NegotiationError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Device busy
    pub const DEVICE_BUSY: u8 = 13;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// No baud rate produced a response
    pub const NO_RESPONSE: u8 = 18;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success that prints `msg`
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Bad command-line input
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Stopped by Ctrl-C or the time budget
    pub fn cancelled() -> Self {
        Self::Error(ExitCodes::CANCELLED, "Cancelled".to_string())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) => Some(msg),
            Self::Error(_, msg) => Some(msg),
            _ => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::PortBusy(_) => ExitCodes::DEVICE_BUSY,
        TransportError::ConnectionFailed(_) => ExitCodes::CONNECTION_FAILED,
        TransportError::Io(_) | TransportError::Closed => ExitCodes::ERROR,
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        Self::Error(transport_code(&err), err.to_string())
    }
}

impl From<&NegotiationError> for CliResult {
    fn from(err: &NegotiationError) -> Self {
        match err {
            NegotiationError::NoResponse { .. } => {
                Self::Error(ExitCodes::NO_RESPONSE, err.to_string())
            }
            NegotiationError::Cancelled { .. } => Self::cancelled(),
            NegotiationError::Reopen { source, .. } => {
                Self::Error(transport_code(source), err.to_string())
            }
        }
    }
}

impl From<ConfigError> for CliResult {
    fn from(err: ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        7 => "Permission denied",
        8 => "Configuration error",
        11 => "Operation cancelled",
        13 => "Device busy",
        14 => "Port not found",
        18 => "No response at any baud rate",
        _ => "Unknown error",
    }
}

/// Exit code table, one code per line
pub fn exit_code_table() -> String {
    let mut table = String::from("Exit Codes:\n");
    for code in [0, 1, 2, 3, 7, 8, 11, 13, 14, 18] {
        table.push_str(&format!("  {:>3}  {}\n", code, exit_code_description(code)));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::ScanSession;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_transport_error() {
        let result = CliResult::from(TransportError::PortNotFound("COM9".into()));
        assert_eq!(result.code(), ExitCodes::PORT_NOT_FOUND);
        let result = CliResult::from(TransportError::PortBusy("COM3".into()));
        assert_eq!(result.code(), ExitCodes::DEVICE_BUSY);
    }

    #[test]
    fn test_from_negotiation_error() {
        let err = NegotiationError::NoResponse {
            tried: vec![9600],
            session: Box::new(ScanSession::new("COM3")),
        };
        assert_eq!(CliResult::from(&err).code(), ExitCodes::NO_RESPONSE);

        let err = NegotiationError::Cancelled {
            session: Box::new(ScanSession::new("COM3")),
        };
        assert_eq!(CliResult::from(&err).code(), ExitCodes::CANCELLED);

        let err = NegotiationError::Reopen {
            baud: 9600,
            source: TransportError::PermissionDenied("COM3".into()),
            session: Box::new(ScanSession::new("COM3")),
        };
        let result = CliResult::from(&err);
        assert_eq!(result.code(), ExitCodes::PERMISSION_DENIED);
        assert!(result.message().unwrap().contains("reopen port at 9600 baud"));
    }

    #[test]
    fn test_exit_code_table() {
        let table = exit_code_table();
        assert!(table.contains(" 18  No response at any baud rate"));
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
