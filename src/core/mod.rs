//! Core module containing the protocol discovery engine
//!
//! This module provides:
//! - Transport layer over serial ports
//! - Candidate frame generation (headers, command codes, terminators, checksums)
//! - Probe execution with per-probe failure containment
//! - Baud rate negotiation and the full-scan driver
//! - Response classification
//! - Scan sessions and reporting rows
//! - Passive listening
//! - Hex codec and checksum helpers

pub mod cancel;
pub mod classifier;
pub mod codec;
pub mod executor;
pub mod frame;
pub mod generator;
pub mod monitor;
pub mod negotiator;
pub mod protocol;
pub mod session;
pub mod transport;
