//! Scan settings

use super::ConfigError;
use crate::core::classifier::ClassifierSettings;
use crate::core::executor::ProbeExecutor;
use crate::core::frame::MAX_PREFIXED_PAYLOAD;
use crate::core::generator::GeneratorConfig;
use crate::core::negotiator::{
    NegotiationOptions, ScanOptions, DEFAULT_BAUD_RATES, EXTENDED_BAUD_RATES,
};
use crate::core::transport::LineSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Scan configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Device identifier (overridden by `--port`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Baud rates to try, in priority order
    pub baud_rates: Vec<u32>,
    /// Stop negotiating at the first rate that answers
    pub stop_on_first_response: bool,
    /// Run the whole candidate space once a rate is found
    pub full_scan: bool,
    /// Line settings
    pub line: LineSettings,
    /// Delays and windows
    pub timing: TimingConfig,
    /// Frame generator combinators
    pub generator: GeneratorConfig,
    /// Response heuristics
    pub classifier: ClassifierSettings,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            stop_on_first_response: true,
            full_scan: true,
            line: LineSettings::default(),
            timing: TimingConfig::default(),
            generator: GeneratorConfig::default(),
            classifier: ClassifierSettings::default(),
        }
    }
}

/// Delays and windows, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between write and read
    pub per_frame_delay_ms: u64,
    /// Settle window for full scans
    pub settle_window_ms: u64,
    /// Input poll interval inside a settle window
    pub poll_interval_ms: u64,
    /// Settle window for the negotiation pre-filter
    pub negotiation_settle_window_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            per_frame_delay_ms: 150,
            settle_window_ms: 500,
            poll_interval_ms: 50,
            negotiation_settle_window_ms: 300,
        }
    }
}

impl TimingConfig {
    /// Pause between write and read
    pub fn per_frame_delay(&self) -> Duration {
        Duration::from_millis(self.per_frame_delay_ms)
    }

    /// Full-scan read window
    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    /// How often a read polls the port
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Read window during baud negotiation
    pub fn negotiation_settle_window(&self) -> Duration {
        Duration::from_millis(self.negotiation_settle_window_ms)
    }
}

impl ScanConfig {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load `path` if given, else the default config file if it exists,
    /// else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match super::default_config_path() {
            Ok(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Save config as pretty TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings that cannot produce a meaningful scan
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.baud_rates.is_empty() {
            return invalid("baud_rates must not be empty");
        }
        if self.baud_rates.contains(&0) {
            return invalid("baud rate 0 is not valid");
        }
        if !(5..=8).contains(&self.line.data_bits) {
            return invalid("data_bits must be between 5 and 8");
        }
        if !matches!(self.line.stop_bits, 1 | 2) {
            return invalid("stop_bits must be 1 or 2");
        }
        if self.timing.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be greater than 0");
        }

        let generator = &self.generator;
        if generator.headers.is_empty() {
            return invalid("generator.headers must not be empty");
        }
        if generator.commands.is_empty() {
            return invalid("generator.commands must not be empty");
        }
        if generator.payloads.is_empty() {
            return invalid("generator.payloads must not be empty (use [\"\"] for none)");
        }
        if generator.length_prefix.is_empty() {
            return invalid("generator.length_prefix must not be empty");
        }
        if generator.length_prefix.contains(&true)
            && generator.payloads.iter().any(|p| p.len() > MAX_PREFIXED_PAYLOAD)
        {
            return Err(ConfigError::Invalid(format!(
                "generator.payloads longer than {} bytes cannot be length-prefixed",
                MAX_PREFIXED_PAYLOAD
            )));
        }
        if generator.terminators.is_empty() {
            return invalid("generator.terminators must not be empty");
        }
        if generator.checksums.is_empty() {
            return invalid("generator.checksums must not be empty");
        }
        if self.classifier.min_value >= self.classifier.max_value {
            return invalid("classifier.min_value must be less than max_value");
        }
        Ok(())
    }

    /// Configured rates followed by the slow extended rates not already listed
    pub fn extended_baud_rates(&self) -> Vec<u32> {
        let mut rates = self.baud_rates.clone();
        for &baud in EXTENDED_BAUD_RATES {
            if !rates.contains(&baud) {
                rates.push(baud);
            }
        }
        rates
    }

    /// Executor for full scans
    pub fn executor(&self) -> ProbeExecutor {
        ProbeExecutor::new(self.timing.per_frame_delay(), self.timing.settle_window())
    }

    /// Negotiation parameters
    pub fn negotiation_options(&self) -> NegotiationOptions {
        NegotiationOptions {
            baud_rates: self.baud_rates.clone(),
            line: self.line.clone(),
            stop_on_first_response: self.stop_on_first_response,
            executor: self
                .executor()
                .with_settle_window(self.timing.negotiation_settle_window()),
        }
    }

    /// Negotiation plus full-scan parameters
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            negotiation: self.negotiation_options(),
            full_scan: self.full_scan,
            executor: self.executor(),
        }
    }
}
