//! Candidate frame generation
//!
//! Builds the search space of command frames from a fixed set of
//! combinators. Generation is a pure function of [`GeneratorConfig`]: the
//! same configuration always yields the same frames in the same order, and
//! no two frames share a byte sequence.
//!
//! Order: header → command code (ascending) → payload → length prefix →
//! terminator → checksum, followed by the optional wake dictionary.
//! Length-prefixed combinations whose payload does not fit the length byte
//! are left out.

use super::codec::hex::serde_hex_list;
use super::frame::{
    CommandCode, CommandFrame, FrameSpec, HeaderVariant, Terminator, MAX_PREFIXED_PAYLOAD,
};
use super::protocol::checksum::ChecksumKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Known command codes and their guessed meaning
pub const COMMAND_TABLE: &[(u8, &str)] = &[
    (0x00, "Init"),
    (0x01, "Connect/Handshake"),
    (0x02, "Get Device Info"),
    (0x03, "Get Status"),
    (0x04, "Read Record Count"),
    (0x05, "Read Records"),
    (0x06, "Read Record by Index"),
    (0x10, "Get History"),
    (0x11, "Get All Records"),
    (0x20, "Get Time"),
    (0x21, "Set Time"),
    (0x30, "Get Device ID"),
    (0x40, "Read Data"),
    (0x50, "Get Alcohol Level"),
    (0x55, "Handshake"),
    (0x5A, "Connect"),
    (0xA5, "Special Command"),
    (0xAA, "Sync"),
    (0xF0, "Get Info"),
    (0xFA, "Status Query"),
    (0xFF, "Reset/Init"),
];

/// Command table as [`CommandCode`]s
pub fn command_table() -> Vec<CommandCode> {
    COMMAND_TABLE
        .iter()
        .map(|&(code, label)| CommandCode::new(code, label))
        .collect()
}

/// Label for a command byte, if it is in the table
pub fn command_label(code: u8) -> Option<&'static str> {
    COMMAND_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
}

/// Combinator sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Header variants
    pub headers: Vec<HeaderVariant>,
    /// Command codes (sorted and de-duplicated before use)
    pub commands: Vec<CommandCode>,
    /// Payloads appended after the command code
    #[serde(with = "serde_hex_list")]
    pub payloads: Vec<Vec<u8>>,
    /// Length-prefix axis
    pub length_prefix: Vec<bool>,
    /// Terminators
    pub terminators: Vec<Terminator>,
    /// Checksums
    pub checksums: Vec<ChecksumKind>,
    /// Append the wake dictionary after the combinatorial frames
    pub include_wake_sequences: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            headers: HeaderVariant::all().to_vec(),
            commands: command_table(),
            payloads: vec![vec![], vec![0x00], vec![0x01]],
            length_prefix: vec![false],
            terminators: Terminator::all().to_vec(),
            checksums: ChecksumKind::all().to_vec(),
            include_wake_sequences: false,
        }
    }
}

impl GeneratorConfig {
    /// Command codes in generation order
    pub fn sorted_commands(&self) -> Vec<CommandCode> {
        let mut commands = self.commands.clone();
        commands.sort_by_key(|c| c.code);
        commands.dedup_by_key(|c| c.code);
        commands
    }

    /// Frame count before de-duplication
    pub fn combinations(&self) -> usize {
        let combinatorial = self.headers.len()
            * self.sorted_commands().len()
            * self.payloads.len()
            * self.length_prefix.len()
            * self.terminators.len()
            * self.checksums.len();
        if self.include_wake_sequences {
            combinatorial + WAKE_SEQUENCES.len()
        } else {
            combinatorial
        }
    }

    /// Generate the candidate space
    pub fn generate(&self) -> CandidateSpace {
        generate(self)
    }
}

/// Ordered, de-duplicated candidate frames
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSpace {
    frames: Vec<CommandFrame>,
}

impl CandidateSpace {
    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when nothing was generated
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Iterate in generation order
    pub fn iter(&self) -> std::slice::Iter<'_, CommandFrame> {
        self.frames.iter()
    }

    /// Frames as a slice
    pub fn frames(&self) -> &[CommandFrame] {
        &self.frames
    }

    fn push_unique(&mut self, seen: &mut HashSet<Vec<u8>>, frame: CommandFrame) {
        if seen.insert(frame.bytes().to_vec()) {
            self.frames.push(frame);
        }
    }
}

impl<'a> IntoIterator for &'a CandidateSpace {
    type Item = &'a CommandFrame;
    type IntoIter = std::slice::Iter<'a, CommandFrame>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.iter()
    }
}

impl From<CandidateSpace> for Vec<CommandFrame> {
    fn from(space: CandidateSpace) -> Self {
        space.frames
    }
}

/// Generate the candidate space for `config`
pub fn generate(config: &GeneratorConfig) -> CandidateSpace {
    let commands = config.sorted_commands();
    let mut space = CandidateSpace::default();
    let mut seen = HashSet::new();
    let mut oversized = 0usize;

    for &header in &config.headers {
        for command in &commands {
            for payload in &config.payloads {
                for &length_prefixed in &config.length_prefix {
                    for &terminator in &config.terminators {
                        for &checksum in &config.checksums {
                            match CommandFrame::build(&FrameSpec {
                                header,
                                command,
                                payload,
                                length_prefixed,
                                terminator,
                                checksum,
                            }) {
                                Some(frame) => space.push_unique(&mut seen, frame),
                                None => oversized += 1,
                            }
                        }
                    }
                }
            }
        }
    }

    if oversized > 0 {
        tracing::warn!(
            oversized,
            max_payload = MAX_PREFIXED_PAYLOAD,
            "Skipped length-prefixed frames with oversized payloads"
        );
    }

    if config.include_wake_sequences {
        for frame in wake_sequences() {
            space.push_unique(&mut seen, frame);
        }
    }

    tracing::debug!(
        frames = space.len(),
        combinations = config.combinations(),
        "Candidate space generated"
    );
    space
}

const WAKE_SEQUENCES: &[(&[u8], &str)] = &[
    (&[0x00], "wake 00"),
    (&[0x00, 0x00], "wake 00 00"),
    (&[0xFF], "wake FF"),
    (&[0xFF; 10], "wake FF x10"),
    (&[0x55, 0xAA], "sync 55 AA"),
    (&[0xAA, 0x55], "sync AA 55"),
    (&[0x5A, 0xA5], "sync 5A A5"),
    (&[0xA5, 0x5A], "sync A5 5A"),
    (b"AT\r\n", "AT command"),
    (b"AT+VER\r\n", "AT version query"),
    (b"?\r\n", "query"),
    (b"ID?\r\n", "ID query"),
];

/// Fixed wake-up and handshake sequences
pub fn wake_sequences() -> Vec<CommandFrame> {
    WAKE_SEQUENCES
        .iter()
        .map(|&(bytes, label)| CommandFrame::literal(bytes, label))
        .collect()
}

/// Small canonical set used to find the baud rate before a full scan
pub fn probe_subset() -> Vec<CommandFrame> {
    let cmd = |code: u8| CommandCode::new(code, command_label(code).unwrap_or("Unknown"));
    let frame = |header, code: u8, terminator| {
        CommandFrame::build(&FrameSpec {
            header,
            command: &cmd(code),
            payload: &[],
            length_prefixed: false,
            terminator,
            checksum: ChecksumKind::None,
        })
    };

    [
        frame(HeaderVariant::BinaryFaF5, 0x01, Terminator::None),
        frame(HeaderVariant::BinaryFaF5, 0x03, Terminator::None),
        frame(HeaderVariant::BinaryFaF5, 0x05, Terminator::None),
        frame(HeaderVariant::BinaryA5, 0x01, Terminator::Crlf),
        frame(HeaderVariant::BinaryA5, 0x05, Terminator::Crlf),
        frame(HeaderVariant::AsciiFaF5, 0x01, Terminator::Crlf),
        Some(CommandFrame::literal([0x55, 0xAA], "sync 55 AA")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::EncodingKind;

    fn small_config() -> GeneratorConfig {
        GeneratorConfig {
            headers: vec![HeaderVariant::None, HeaderVariant::BinaryA5],
            commands: vec![CommandCode::new(0xA5, "Special"), CommandCode::new(0x01, "Connect")],
            payloads: vec![vec![], vec![0x01]],
            length_prefix: vec![false],
            terminators: vec![Terminator::None],
            checksums: vec![ChecksumKind::None],
            include_wake_sequences: false,
        }
    }

    #[test]
    fn test_deterministic() {
        let config = GeneratorConfig::default();
        let first = generate(&config);
        let second = generate(&config);
        assert!(!first.is_empty());
        let a: Vec<&[u8]> = first.iter().map(|f| f.bytes()).collect();
        let b: Vec<&[u8]> = second.iter().map(|f| f.bytes()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_duplicate_bytes() {
        let mut config = GeneratorConfig::default();
        config.include_wake_sequences = true;
        config.length_prefix = vec![false, true];
        let space = generate(&config);
        let unique: HashSet<&[u8]> = space.iter().map(|f| f.bytes()).collect();
        assert_eq!(unique.len(), space.len());
        assert!(space.len() <= config.combinations());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let space = generate(&small_config());
        let bytes: Vec<Vec<u8>> = space.iter().map(|f| f.bytes().to_vec()).collect();
        assert_eq!(
            bytes,
            vec![
                vec![0x01],
                vec![0x01, 0x01],
                vec![0xA5],
                vec![0xA5, 0x01],
                vec![0xA5, 0x01, 0x01],
                vec![0xA5, 0xA5],
                vec![0xA5, 0xA5, 0x01],
            ]
        );
        // A5 01 came first from the bare 0xA5 command
        assert_eq!(space.frames()[3].meta().header, HeaderVariant::None);
    }

    #[test]
    fn test_order_header_then_code() {
        let space = generate(&GeneratorConfig::default());
        let first = space.frames()[0].meta();
        assert_eq!(first.header, HeaderVariant::None);
        assert_eq!(first.command.as_ref().map(|c| c.code), Some(0x00));

        let headers: Vec<HeaderVariant> = space.iter().map(|f| f.meta().header).collect();
        let mut sorted = headers.clone();
        sorted.sort_by_key(|h| HeaderVariant::all().iter().position(|x| x == h));
        assert_eq!(headers, sorted);
    }

    #[test]
    fn test_oversized_length_prefixed_payload_is_skipped() {
        let mut config = small_config();
        config.payloads = vec![vec![], vec![0x00; MAX_PREFIXED_PAYLOAD + 1]];
        config.length_prefix = vec![false, true];
        let space = generate(&config);

        assert!(space.iter().all(|f| f.bytes().len() < 300));
        let prefixed: Vec<&CommandFrame> =
            space.iter().filter(|f| f.meta().length_prefixed).collect();
        assert!(!prefixed.is_empty());
        assert!(prefixed.iter().all(|f| f.meta().payload.is_empty()));
        // Without the length byte the long payload still goes out
        assert!(space.iter().any(|f| f.meta().payload.len() == MAX_PREFIXED_PAYLOAD + 1));
    }

    #[test]
    fn test_wake_sequences_appended() {
        let mut config = small_config();
        config.include_wake_sequences = true;
        let space = generate(&config);
        let last = space.frames().last().unwrap();
        assert_eq!(last.bytes(), b"ID?\r\n");
        assert_eq!(last.meta().encoding, EncodingKind::Literal);
        // 0x01 alone is not in the dictionary; all 12 entries are new
        assert_eq!(space.len(), 7 + WAKE_SEQUENCES.len());
    }

    #[test]
    fn test_probe_subset() {
        let hex: Vec<String> = probe_subset().iter().map(|f| f.to_hex()).collect();
        assert_eq!(
            hex,
            vec![
                "FAF501",
                "FAF503",
                "FAF505",
                "A5010D0A",
                "A5050D0A",
                "4641463530310D0A",
                "55AA",
            ]
        );
    }

    #[test]
    fn test_commands_sorted_and_deduped() {
        let mut config = small_config();
        config.commands.push(CommandCode::new(0x01, "Duplicate"));
        let commands = config.sorted_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].code, 0x01);
        assert_eq!(command_label(0x50), Some("Get Alcohol Level"));
        assert_eq!(command_label(0x99), None);
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = GeneratorConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: GeneratorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
