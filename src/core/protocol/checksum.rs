//! Trailing checksum bytes for candidate frames
//!
//! Supports: none, XOR of all bytes, sum of all bytes modulo 256

use serde::{Deserialize, Serialize};

/// Checksum appended as the last byte of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumKind {
    /// No checksum
    #[default]
    None,
    /// XOR of all preceding bytes
    Xor,
    /// Sum of all preceding bytes, modulo 256
    Sum8,
}

impl ChecksumKind {
    /// Get all checksum kinds, in generation order
    pub fn all() -> &'static [ChecksumKind] {
        &[ChecksumKind::None, ChecksumKind::Xor, ChecksumKind::Sum8]
    }

    /// Get name of checksum kind
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumKind::None => "None",
            ChecksumKind::Xor => "XOR",
            ChecksumKind::Sum8 => "Sum-8",
        }
    }
}

/// Calculate the checksum bytes for `data`
pub fn calculate(data: &[u8], kind: ChecksumKind) -> Option<u8> {
    match kind {
        ChecksumKind::None => None,
        ChecksumKind::Xor => Some(xor_checksum(data)),
        ChecksumKind::Sum8 => Some(sum8_checksum(data)),
    }
}

/// Append the checksum for the current contents of `frame` to `frame`
pub fn append(frame: &mut Vec<u8>, kind: ChecksumKind) {
    if let Some(byte) = calculate(frame, kind) {
        frame.push(byte);
    }
}

/// XOR checksum - XOR of all bytes
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Simple 8-bit sum
pub fn sum8_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}
