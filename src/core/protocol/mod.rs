//! Protocol building blocks
//!
//! Provides the checksum algorithms appended to candidate frames.

pub mod checksum;

pub use checksum::ChecksumKind;
