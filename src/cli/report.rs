//! Report rendering
//!
//! Turns sessions, candidate spaces and captures into text tables or JSON.

use crate::core::classifier::{ClassifiedResponse, Classifier};
use crate::core::codec::{escaped, hex as hexfmt, hexdump};
use crate::core::generator::CandidateSpace;
use crate::core::monitor::MonitorCapture;
use crate::core::session::ScanSession;
use crate::core::transport::PortInfo;
use clap::ValueEnum;
use serde_json::json;
use std::fmt::Write;

/// Inputs longer than this are rendered as a hexdump
const HEXDUMP_WIDTH: usize = 16;

/// CLI output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for scripting
    Json,
}

/// Render every probe of a session plus its summary
pub fn session_report(
    session: &ScanSession,
    classifier: &Classifier,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    let rows = session.report_rows(classifier);
    let summary = session.summary();

    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "id": session.id(),
            "port": session.port(),
            "started_at": session.started_at(),
            "summary": summary,
            "attempts": session.attempts(),
            "probes": rows,
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "Session {} on {} (started {})",
                session.id(),
                session.port(),
                session.started_at().format("%Y-%m-%d %H:%M:%S")
            );
            let _ = writeln!(
                out,
                "{:>7}  {:<28}  {:<28}  {}",
                "BAUD", "SENT", "RECEIVED", "SUMMARY"
            );
            for row in &rows {
                let summary = match &row.failure {
                    Some(failure) => format!("! {}", failure),
                    None => row.summary.clone(),
                };
                let _ = writeln!(
                    out,
                    "{:>7}  {:<28}  {:<28}  {}",
                    row.baud,
                    row.sent,
                    if row.received.is_empty() { "-" } else { row.received.as_str() },
                    summary
                );
            }
            let _ = writeln!(out);
            let _ = write!(out, "{}", summary);

            let found = session.successful_frames();
            if !found.is_empty() {
                let _ = writeln!(out, "\nFrames that got a response:");
                for result in found {
                    let _ = writeln!(
                        out,
                        "  @{} {} -> {} \"{}\"",
                        result.baud(),
                        result.frame(),
                        hexfmt::spaced(result.raw_response()),
                        escaped(result.raw_response())
                    );
                }
            }
            Ok(out)
        }
    }
}

/// Render the candidate space
pub fn frames_report(space: &CandidateSpace, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(space.frames()),
        OutputFormat::Text => {
            let mut out = String::new();
            for (i, frame) in space.iter().enumerate() {
                let _ = writeln!(out, "{:>5}  {}", i + 1, frame);
            }
            let _ = writeln!(out, "{} frames", space.len());
            Ok(out)
        }
    }
}

/// Render one offline classification
pub fn classification_report(
    raw: &[u8],
    classified: &ClassifiedResponse,
    format: OutputFormat,
) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(classified),
        OutputFormat::Text => {
            let mut out = String::new();
            if raw.len() > HEXDUMP_WIDTH {
                let _ = writeln!(out, "Input:      {} bytes", raw.len());
                out.push_str(&hexdump(raw, HEXDUMP_WIDTH));
            } else {
                let _ = writeln!(out, "Input:      {}", hexfmt::spaced(raw));
            }
            let _ = writeln!(out, "Printable:  {}", classified.is_printable_ascii);
            if let Some(decoded) = &classified.decoded_ascii_hex {
                let _ = writeln!(out, "Hex text:   {}", hexfmt::spaced(decoded));
            }
            if let Some(header) = &classified.header_match {
                let _ = writeln!(
                    out,
                    "Header:     {} ({:?})",
                    hexfmt::spaced(&header.prefix),
                    header.source
                );
                if let Some(command) = header.command {
                    let _ = writeln!(out, "Command:    {:02X}", command);
                }
                if !header.data.is_empty() {
                    let _ = writeln!(out, "Data:       {}", hexfmt::spaced(&header.data));
                }
            }
            for c in &classified.numeric_candidates {
                let _ = writeln!(out, "Value:      {} at offset {} ({})", c.value, c.offset, c.endianness);
            }
            let _ = writeln!(out, "Summary:    {}", classified.summary());
            Ok(out)
        }
    }
}

/// Render passive captures
pub fn capture_report(captures: &[MonitorCapture], format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(captures),
        OutputFormat::Text => {
            let mut out = String::new();
            for capture in captures {
                match &capture.error {
                    Some(error) => {
                        let _ = writeln!(out, "{:>7} baud: {}", capture.baud, error);
                    }
                    None => {
                        let _ = writeln!(
                            out,
                            "{:>7} baud: {} bytes in {} chunks",
                            capture.baud,
                            capture.total_bytes(),
                            capture.chunks.len()
                        );
                    }
                }
                for chunk in &capture.chunks {
                    let _ = writeln!(
                        out,
                        "  +{:>6} ms  {}  \"{}\"",
                        chunk.elapsed_ms,
                        hexfmt::spaced(&chunk.data),
                        escaped(&chunk.data)
                    );
                }
            }
            Ok(out)
        }
    }
}

/// Render the port list
pub fn ports_report(ports: &[PortInfo], format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(ports),
        OutputFormat::Text => {
            if ports.is_empty() {
                return Ok("No serial ports found.\n".to_string());
            }
            let mut out = String::from("Available Serial Ports:\n");
            for port in ports {
                let _ = writeln!(out, "  {:<20} {}", port.name, port.description);
            }
            Ok(out)
        }
    }
}
