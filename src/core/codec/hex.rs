//! Hexadecimal rendering and parsing for probe reports

use super::CodecError;

/// Uppercase hex with a space between bytes
pub fn spaced(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse user-supplied hex, tolerating `0x` prefixes, spaces, commas and colons
pub fn parse(text: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned: String = text
        .replace("0x", "")
        .replace("0X", "")
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, ',' | ':' | '-'))
        .collect();

    if let Some((pos, ch)) = cleaned.char_indices().find(|(_, c)| !c.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidCharacter(pos, ch));
    }
    if cleaned.len() % 2 != 0 {
        return Err(CodecError::InvalidFormat(
            "Hex string must have even number of digits".to_string(),
        ));
    }

    hex::decode(&cleaned).map_err(|e| CodecError::InvalidFormat(e.to_string()))
}

/// Serde adapter storing byte vectors as compact uppercase hex strings
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as hex
    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode_upper(data))
    }

    /// Deserialize bytes from hex
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing a list of byte vectors as hex strings
pub mod serde_hex_list {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize each entry as hex
    pub fn serialize<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(hex::encode_upper))
    }

    /// Deserialize a list of hex strings
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|h| hex::decode(h).map_err(serde::de::Error::custom))
            .collect()
    }
}
