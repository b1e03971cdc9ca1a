//! Response classification
//!
//! Turns raw response bytes into structured, human-reviewable hypotheses.
//! Every heuristic runs independently of the others and none of them can
//! fail: an empty response classifies to an all-empty structure.

use super::codec::hex::{serde_hex, serde_hex_list};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// Lower exclusive bound for plausible readings
pub const DEFAULT_MIN_VALUE: u16 = 0;

/// Upper exclusive bound for plausible readings (breath-alcohol range)
pub const DEFAULT_MAX_VALUE: u16 = 5000;

/// Byte order of a numeric candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    /// Little-endian
    #[serde(rename = "LE")]
    Little,
    /// Big-endian
    #[serde(rename = "BE")]
    Big,
}

impl fmt::Display for Endianness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "LE"),
            Self::Big => write!(f, "BE"),
        }
    }
}

/// A 16-bit value found at some offset of the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericCandidate {
    /// Offset of the first byte
    pub offset: usize,
    /// Byte order used for the interpretation
    pub endianness: Endianness,
    /// Decoded value
    pub value: u16,
}

/// Where a known header was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// At the start of the raw bytes
    Raw,
    /// At the start of the ASCII-hex decoded bytes
    DecodedHex,
}

/// The longest known header prefix a response starts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    /// The matched prefix
    #[serde(with = "serde_hex")]
    pub prefix: Vec<u8>,
    /// Which view of the response matched
    pub source: MatchSource,
    /// Byte right after the prefix, read as the command being answered
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub command: Option<u8>,
    /// Everything after the command byte
    #[serde(with = "serde_hex", skip_serializing_if = "Vec::is_empty", default)]
    pub data: Vec<u8>,
}

impl HeaderMatch {
    fn split(prefix: Vec<u8>, view: &[u8], source: MatchSource) -> Self {
        let rest = &view[prefix.len()..];
        Self {
            command: rest.first().copied(),
            data: rest.get(1..).map(<[u8]>::to_vec).unwrap_or_default(),
            prefix,
            source,
        }
    }
}

/// Structured interpretation of one response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedResponse {
    /// Every byte is printable ASCII (CR, LF and TAB allowed); false when empty
    pub is_printable_ascii: bool,
    /// Bytes decoded from an all-hex-digit response
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub decoded_ascii_hex: Option<Vec<u8>>,
    /// Longest known header prefix
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub header_match: Option<HeaderMatch>,
    /// Plausible 16-bit readings, ordered by offset then LE before BE
    pub numeric_candidates: Vec<NumericCandidate>,
}

impl ClassifiedResponse {
    /// True when no heuristic produced anything
    pub fn is_empty(&self) -> bool {
        !self.is_printable_ascii
            && self.decoded_ascii_hex.is_none()
            && self.header_match.is_none()
            && self.numeric_candidates.is_empty()
    }

    /// One-line summary for reports
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.is_printable_ascii {
            parts.push("ascii".to_string());
        }
        if let Some(decoded) = &self.decoded_ascii_hex {
            parts.push(format!("hex-text={}", hex::encode_upper(decoded)));
        }
        if let Some(header) = &self.header_match {
            let via = match header.source {
                MatchSource::Raw => "",
                MatchSource::DecodedHex => " (decoded)",
            };
            let mut part = format!("header={}{}", hex::encode_upper(&header.prefix), via);
            if let Some(command) = header.command {
                let _ = write!(part, " cmd={:02X}", command);
            }
            parts.push(part);
        }
        match self.numeric_candidates.len() {
            0 => {}
            1 => {
                let c = &self.numeric_candidates[0];
                parts.push(format!("value {}@{} {}", c.value, c.offset, c.endianness));
            }
            n => parts.push(format!("{} numeric candidates", n)),
        }
        if parts.is_empty() {
            "-".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Tunable heuristics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Values must be strictly greater than this
    pub min_value: u16,
    /// Values must be strictly less than this
    pub max_value: u16,
    /// Header prefixes to look for
    #[serde(with = "serde_hex_list")]
    pub known_headers: Vec<Vec<u8>>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_value: DEFAULT_MIN_VALUE,
            max_value: DEFAULT_MAX_VALUE,
            known_headers: vec![vec![0xFA, 0xF5], vec![0xA5]],
        }
    }
}

/// Response classifier
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    settings: ClassifierSettings,
}

impl Classifier {
    /// Create a classifier with custom settings
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    /// Settings in use
    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Classify a response
    pub fn classify(&self, raw: &[u8]) -> ClassifiedResponse {
        let decoded_ascii_hex = decode_ascii_hex(raw);
        let header_match = self
            .match_header(raw)
            .map(|prefix| HeaderMatch::split(prefix, raw, MatchSource::Raw))
            .or_else(|| {
                decoded_ascii_hex.as_deref().and_then(|decoded| {
                    self.match_header(decoded)
                        .map(|prefix| HeaderMatch::split(prefix, decoded, MatchSource::DecodedHex))
                })
            });

        ClassifiedResponse {
            is_printable_ascii: is_printable_ascii(raw),
            decoded_ascii_hex,
            header_match,
            numeric_candidates: self.numeric_candidates(raw),
        }
    }

    fn match_header(&self, data: &[u8]) -> Option<Vec<u8>> {
        self.settings
            .known_headers
            .iter()
            .filter(|h| !h.is_empty() && data.starts_with(h))
            .max_by_key(|h| h.len())
            .cloned()
    }

    fn numeric_candidates(&self, raw: &[u8]) -> Vec<NumericCandidate> {
        let (min, max) = (self.settings.min_value, self.settings.max_value);
        let mut candidates = Vec::new();

        for (offset, pair) in raw.windows(2).enumerate() {
            let pair = [pair[0], pair[1]];
            for (endianness, value) in [
                (Endianness::Little, u16::from_le_bytes(pair)),
                (Endianness::Big, u16::from_be_bytes(pair)),
            ] {
                if value > min && value < max {
                    candidates.push(NumericCandidate {
                        offset,
                        endianness,
                        value,
                    });
                }
            }
        }

        candidates
    }
}

/// Classify with the default heuristics
pub fn classify(raw: &[u8]) -> ClassifiedResponse {
    Classifier::default().classify(raw)
}

fn is_printable_ascii(raw: &[u8]) -> bool {
    !raw.is_empty()
        && raw
            .iter()
            .all(|&b| b.is_ascii_graphic() || matches!(b, b' ' | b'\r' | b'\n' | b'\t'))
}

/// Decode an all-hex-digit response. A single trailing line ending is ignored.
fn decode_ascii_hex(raw: &[u8]) -> Option<Vec<u8>> {
    let text = raw
        .strip_suffix(b"\r\n")
        .or_else(|| raw.strip_suffix(b"\n"))
        .or_else(|| raw.strip_suffix(b"\r"))
        .unwrap_or(raw);

    if text.is_empty() || !text.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    hex::decode(text).ok()
}
