//! # Serialprobe Core Library
//!
//! Protocol discovery for serial devices that come without documentation:
//! - Combinatorial candidate frame generation (headers, command codes,
//!   payloads, terminators, checksums)
//! - Probe execution with per-probe failure containment
//! - Baud rate negotiation with early exit
//! - Response classification (ASCII-hex, known headers, plausible readings)
//! - Passive listening
//!
//! ## Example
//!
//! ```rust,no_run
//! use serialprobe_core::{
//!     generator, negotiate, NegotiationOptions, ScanControl, SerialConnector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connector = SerialConnector::default();
//!     let negotiation = negotiate(
//!         &connector,
//!         "/dev/ttyUSB0",
//!         &NegotiationOptions::default(),
//!         &generator::probe_subset(),
//!         &ScanControl::new(),
//!     )
//!     .await?;
//!
//!     for result in negotiation.session.successful_frames() {
//!         println!("{} -> {}", result.frame(), result.classify().summary());
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{ConfigError, ScanConfig, TimingConfig};
pub use crate::core::cancel::ScanControl;
pub use crate::core::classifier::{classify, ClassifiedResponse, Classifier, ClassifierSettings};
pub use crate::core::executor::ProbeExecutor;
pub use crate::core::frame::{CommandCode, CommandFrame, EncodingKind, HeaderVariant, Terminator};
pub use crate::core::generator::{self, generate, CandidateSpace, GeneratorConfig};
pub use crate::core::monitor::{monitor, monitor_bauds, MonitorCapture, ReceivedChunk};
pub use crate::core::negotiator::{
    negotiate, scan, scan_at, BaudNegotiator, Negotiation, NegotiationError, NegotiationOptions,
    NegotiationState, ScanOptions,
};
pub use crate::core::protocol::ChecksumKind;
pub use crate::core::session::{ProbeFailure, ProbeResult, ProbeStage, ScanSession, ScanSummary};
pub use crate::core::transport::{
    Connector, LineSettings, SerialConnector, SerialParity, SerialTransport, Transport,
    TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
