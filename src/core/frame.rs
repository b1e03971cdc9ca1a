//! Candidate command frames
//!
//! A [`CommandFrame`] is the exact byte sequence put on the wire plus the
//! combinator choices that produced it. Equality and hashing look at the
//! bytes only; the metadata is provenance.

use super::codec::hex::{self as hexfmt, serde_hex};
use super::protocol::checksum::{self, ChecksumKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Longest payload that still fits a one-byte length prefix (which also
/// counts the command code)
pub const MAX_PREFIXED_PAYLOAD: usize = u8::MAX as usize - 1;

/// How the body of a frame is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingKind {
    /// Raw bytes
    Binary,
    /// Upper-case hex digits as ASCII text (`0x01` becomes `"01"`)
    AsciiHex,
    /// Fixed dictionary bytes, not produced by the combinators
    Literal,
}

/// Header prefix hypothesised to start a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderVariant {
    /// No header
    #[default]
    None,
    /// Binary `FA F5`
    BinaryFaF5,
    /// ASCII text `"FAF5"`
    AsciiFaF5,
    /// Binary `A5`
    BinaryA5,
}

impl HeaderVariant {
    /// All header variants, in generation order
    pub fn all() -> &'static [HeaderVariant] {
        &[
            HeaderVariant::None,
            HeaderVariant::BinaryFaF5,
            HeaderVariant::AsciiFaF5,
            HeaderVariant::BinaryA5,
        ]
    }

    /// Bytes put on the wire for this header
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            HeaderVariant::None => &[],
            HeaderVariant::BinaryFaF5 => &[0xFA, 0xF5],
            HeaderVariant::AsciiFaF5 => b"FAF5",
            HeaderVariant::BinaryA5 => &[0xA5],
        }
    }

    /// Encoding used for the command code, length and payload behind this header
    pub fn encoding(&self) -> EncodingKind {
        match self {
            HeaderVariant::AsciiFaF5 => EncodingKind::AsciiHex,
            _ => EncodingKind::Binary,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            HeaderVariant::None => "none",
            HeaderVariant::BinaryFaF5 => "FA F5",
            HeaderVariant::AsciiFaF5 => "\"FAF5\"",
            HeaderVariant::BinaryA5 => "A5",
        }
    }
}

/// Frame terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminator {
    /// No terminator
    #[default]
    None,
    /// Binary `0D 0A`
    Crlf,
    /// ASCII text `"0D0A"`
    AsciiCrlf,
}

impl Terminator {
    /// All terminators, in generation order
    pub fn all() -> &'static [Terminator] {
        &[Terminator::None, Terminator::Crlf, Terminator::AsciiCrlf]
    }

    /// Bytes put on the wire for this terminator
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Terminator::None => &[],
            Terminator::Crlf => b"\r\n",
            Terminator::AsciiCrlf => b"0D0A",
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Terminator::None => "none",
            Terminator::Crlf => "CRLF",
            Terminator::AsciiCrlf => "\"0D0A\"",
        }
    }
}

/// A command byte and its guessed meaning
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandCode {
    /// Command byte
    pub code: u8,
    /// Human-readable guess, never affects the bytes
    pub label: String,
}

impl CommandCode {
    /// Create a command code
    pub fn new(code: u8, label: impl Into<String>) -> Self {
        Self {
            code,
            label: label.into(),
        }
    }
}

/// Combinator choices a frame was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Body encoding
    pub encoding: EncodingKind,
    /// Header variant
    pub header: HeaderVariant,
    /// Command code, absent for dictionary frames
    pub command: Option<CommandCode>,
    /// Payload bytes before encoding
    #[serde(with = "serde_hex")]
    pub payload: Vec<u8>,
    /// Whether a length byte precedes the command code
    pub length_prefixed: bool,
    /// Terminator
    pub terminator: Terminator,
    /// Trailing checksum
    pub checksum: ChecksumKind,
    /// Free-form label for dictionary frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Parts of a combinatorial frame
#[derive(Debug, Clone)]
pub struct FrameSpec<'a> {
    /// Header variant
    pub header: HeaderVariant,
    /// Command code
    pub command: &'a CommandCode,
    /// Payload bytes (encoded like the command code)
    pub payload: &'a [u8],
    /// Insert a length byte between header and command code
    pub length_prefixed: bool,
    /// Terminator
    pub terminator: Terminator,
    /// Trailing checksum
    pub checksum: ChecksumKind,
}

/// Immutable candidate frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    #[serde(with = "serde_hex")]
    bytes: Vec<u8>,
    meta: FrameMeta,
}

impl CommandFrame {
    /// Assemble a frame: header ++ [length] ++ command ++ payload ++ terminator,
    /// then the checksum over exactly those bytes.
    ///
    /// Returns `None` for a length-prefixed frame whose payload is longer
    /// than [`MAX_PREFIXED_PAYLOAD`].
    pub fn build(spec: &FrameSpec<'_>) -> Option<Self> {
        let encoding = spec.header.encoding();
        let mut bytes = Vec::with_capacity(16);
        bytes.extend_from_slice(spec.header.bytes());

        if spec.length_prefixed {
            // Length covers command code + payload
            let len = u8::try_from(1 + spec.payload.len()).ok()?;
            push_encoded(&mut bytes, &[len], encoding);
        }
        push_encoded(&mut bytes, &[spec.command.code], encoding);
        push_encoded(&mut bytes, spec.payload, encoding);
        bytes.extend_from_slice(spec.terminator.bytes());
        checksum::append(&mut bytes, spec.checksum);

        Some(Self {
            bytes,
            meta: FrameMeta {
                encoding,
                header: spec.header,
                command: Some(spec.command.clone()),
                payload: spec.payload.to_vec(),
                length_prefixed: spec.length_prefixed,
                terminator: spec.terminator,
                checksum: spec.checksum,
                label: None,
            },
        })
    }

    /// Create a dictionary frame from fixed bytes
    pub fn literal(bytes: impl Into<Vec<u8>>, label: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            meta: FrameMeta {
                encoding: EncodingKind::Literal,
                header: HeaderVariant::None,
                command: None,
                payload: Vec::new(),
                length_prefixed: false,
                terminator: Terminator::None,
                checksum: ChecksumKind::None,
                label: Some(label.into()),
            },
        }
    }

    /// Wire bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Provenance metadata
    pub fn meta(&self) -> &FrameMeta {
        &self.meta
    }

    /// Number of bytes on the wire
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for a zero-length frame
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Upper-case compact hex of the wire bytes
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }

    /// Short description of how the frame was built
    pub fn describe(&self) -> String {
        let meta = &self.meta;
        if let Some(label) = &meta.label {
            return label.clone();
        }
        let mut parts = vec![format!("hdr {}", meta.header.name())];
        if let Some(cmd) = &meta.command {
            parts.push(format!("cmd {:02X} ({})", cmd.code, cmd.label));
        }
        if !meta.payload.is_empty() {
            parts.push(format!("data {}", hex::encode_upper(&meta.payload)));
        }
        if meta.length_prefixed {
            parts.push("len".to_string());
        }
        if meta.terminator != Terminator::None {
            parts.push(format!("term {}", meta.terminator.name()));
        }
        if meta.checksum != ChecksumKind::None {
            parts.push(format!("ck {}", meta.checksum.name()));
        }
        parts.join(", ")
    }
}

fn push_encoded(out: &mut Vec<u8>, data: &[u8], encoding: EncodingKind) {
    match encoding {
        EncodingKind::AsciiHex => out.extend_from_slice(hex::encode_upper(data).as_bytes()),
        EncodingKind::Binary | EncodingKind::Literal => out.extend_from_slice(data),
    }
}

impl PartialEq for CommandFrame {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for CommandFrame {}

impl Hash for CommandFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", hexfmt::spaced(&self.bytes), self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>(
        header: HeaderVariant,
        command: &'a CommandCode,
        payload: &'a [u8],
        terminator: Terminator,
        checksum: ChecksumKind,
    ) -> FrameSpec<'a> {
        FrameSpec {
            header,
            command,
            payload,
            length_prefixed: false,
            terminator,
            checksum,
        }
    }

    #[test]
    fn test_binary_assembly_with_checksums() {
        let connect = CommandCode::new(0x01, "Connect");
        let xor = CommandFrame::build(&spec(
            HeaderVariant::BinaryFaF5,
            &connect,
            &[],
            Terminator::None,
            ChecksumKind::Xor,
        ))
        .unwrap();
        assert_eq!(xor.bytes(), &[0xFA, 0xF5, 0x01, 0x0E]);

        let sum = CommandFrame::build(&spec(
            HeaderVariant::BinaryFaF5,
            &connect,
            &[],
            Terminator::None,
            ChecksumKind::Sum8,
        ))
        .unwrap();
        assert_eq!(sum.bytes(), &[0xFA, 0xF5, 0x01, 0xF0]);
    }

    #[test]
    fn test_checksum_covers_terminator() {
        let read = CommandCode::new(0x05, "Read Records");
        let frame = CommandFrame::build(&spec(
            HeaderVariant::BinaryA5,
            &read,
            &[],
            Terminator::Crlf,
            ChecksumKind::Xor,
        ))
        .unwrap();
        assert_eq!(
            frame.bytes(),
            &[0xA5, 0x05, 0x0D, 0x0A, 0xA5 ^ 0x05 ^ 0x0D ^ 0x0A]
        );
    }

    #[test]
    fn test_ascii_hex_assembly() {
        let connect = CommandCode::new(0x01, "Connect");
        let frame = CommandFrame::build(&spec(
            HeaderVariant::AsciiFaF5,
            &connect,
            &[0x0A],
            Terminator::Crlf,
            ChecksumKind::None,
        ))
        .unwrap();
        assert_eq!(frame.bytes(), b"FAF5010A\r\n");
        assert_eq!(frame.meta().encoding, EncodingKind::AsciiHex);
    }

    #[test]
    fn test_length_prefix() {
        let read = CommandCode::new(0x06, "Read Record by Index");
        let frame = CommandFrame::build(&FrameSpec {
            header: HeaderVariant::BinaryFaF5,
            command: &read,
            payload: &[0x01],
            length_prefixed: true,
            terminator: Terminator::None,
            checksum: ChecksumKind::None,
        })
        .unwrap();
        assert_eq!(frame.bytes(), &[0xFA, 0xF5, 0x02, 0x06, 0x01]);
    }

    #[test]
    fn test_length_prefix_limit() {
        let read = CommandCode::new(0x06, "Read Record by Index");
        let payload = vec![0x00; MAX_PREFIXED_PAYLOAD + 1];
        let build = |payload: &[u8], length_prefixed| {
            CommandFrame::build(&FrameSpec {
                header: HeaderVariant::BinaryFaF5,
                command: &read,
                payload,
                length_prefixed,
                terminator: Terminator::None,
                checksum: ChecksumKind::None,
            })
        };

        let longest = build(&payload[1..], true).unwrap();
        assert_eq!(longest.bytes()[2], 0xFF);
        assert!(build(&payload, true).is_none());
        assert_eq!(build(&payload, false).unwrap().len(), 2 + 1 + payload.len());
    }

    #[test]
    fn test_equality_ignores_metadata() {
        let a = CommandFrame::literal(vec![0x55, 0xAA], "wake");
        let code = CommandCode::new(0xAA, "Sync");
        let b = CommandFrame::build(&spec(
            HeaderVariant::None,
            &CommandCode::new(0x55, "Handshake"),
            &[code.code],
            Terminator::None,
            ChecksumKind::None,
        ))
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a.meta(), b.meta());
    }

    #[test]
    fn test_display() {
        let frame = CommandFrame::literal(b"AT\r\n".to_vec(), "AT command");
        assert_eq!(frame.to_string(), "41 54 0D 0A [AT command]");
    }
}
