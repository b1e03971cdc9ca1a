//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Text and JSON reports

pub mod exit_codes;
pub mod report;

pub use exit_codes::{exit_code_description, exit_code_table, CliResult, ExitCodes};
pub use report::OutputFormat;
