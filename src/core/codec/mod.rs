//! Byte rendering helpers
//!
//! Supports:
//! - Spaced hexadecimal and hex parsing
//! - Escaped ASCII for printable previews
//! - Hexdump (like xxd)

pub mod hex;

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Invalid input format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Invalid character
    #[error("Invalid character at position {0}: {1}")]
    InvalidCharacter(usize, char),
}

/// Render bytes as ASCII with C-style escapes for everything non-printable
pub fn escaped(data: &[u8]) -> String {
    data.iter()
        .map(|&b| match b {
            0x00 => "\\0".to_string(),
            0x09 => "\\t".to_string(),
            0x0a => "\\n".to_string(),
            0x0d => "\\r".to_string(),
            b'\\' => "\\\\".to_string(),
            0x20..=0x7e => (b as char).to_string(),
            _ => format!("\\x{:02x}", b),
        })
        .collect()
}

/// Format bytes as a hexdump (like xxd)
pub fn hexdump(data: &[u8], bytes_per_line: usize) -> String {
    let bytes_per_line = bytes_per_line.max(1);
    let mut output = String::new();

    for (offset, chunk) in data.chunks(bytes_per_line).enumerate() {
        output.push_str(&format!("{:08x}  ", offset * bytes_per_line));

        for byte in chunk {
            output.push_str(&format!("{:02x} ", byte));
        }
        for _ in chunk.len()..bytes_per_line {
            output.push_str("   ");
        }

        output.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                output.push(*byte as char);
            } else {
                output.push('.');
            }
        }
        output.push_str("|\n");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        let data = b"Hello, World!";
        let dump = hexdump(data, 16);
        assert!(dump.contains("48 65 6c 6c 6f"));
        assert!(dump.contains("|Hello, World!|"));
    }

    #[test]
    fn test_escaped() {
        assert_eq!(escaped(b"AT\r\n"), "AT\\r\\n");
        assert_eq!(escaped(&[0xFA, 0x00]), "\\xfa\\0");
    }
}
