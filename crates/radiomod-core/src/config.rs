//! Run configuration
//!
//! Holds the validated session parameters the pipeline consumes. The CLI
//! fills this in from flags; it can also be persisted as JSON for scripted
//! setups. Validation runs before any pipeline construction so an invalid
//! configuration never produces a partially-built pipeline.

use crate::ptt::{DEFAULT_EVENT_DEVICE, DEFAULT_KEY_CODE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Maximum length of a source or destination identifier (callsign)
pub const MAX_IDENTIFIER_LEN: usize = 9;

/// Configuration errors, all fatal before the pipeline starts
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("source identifier is required")]
    MissingSource,

    #[error("source identifier too long: {0} characters (max {MAX_IDENTIFIER_LEN})")]
    SourceTooLong(usize),

    #[error("destination identifier too long: {0} characters (max {MAX_IDENTIFIER_LEN})")]
    DestinationTooLong(usize),
}

/// Output format, selected once per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// 2-byte big-endian baseband symbols per frame
    #[default]
    Baseband,
    /// One byte per encoded bit (0x00/0x01)
    Bitstream,
}

/// Diagnostic verbosity; the CLI flags are mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    /// Tracing filter directive for this level
    pub fn filter_directive(self) -> &'static str {
        match self {
            Verbosity::Quiet => "radiomod=error",
            Verbosity::Normal => "radiomod=info",
            Verbosity::Verbose => "radiomod=debug",
            Verbosity::Debug => "radiomod=trace",
        }
    }
}

fn default_event_device() -> String {
    DEFAULT_EVENT_DEVICE.to_string()
}

fn default_key_code() -> u16 {
    DEFAULT_KEY_CODE
}

/// Session configuration consumed by [`crate::pipeline`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Transmitter identifier (callsign)
    pub source: String,
    /// Destination identifier (empty = broadcast)
    #[serde(default)]
    pub destination: String,
    /// Capture device name (None = read stdin)
    #[serde(default)]
    pub audio_device: Option<String>,
    /// PTT event device node
    #[serde(default = "default_event_device")]
    pub event_device: String,
    /// Linux event code for PTT
    #[serde(default = "default_key_code")]
    pub key: u16,
    /// Output format
    #[serde(default)]
    pub mode: OutputMode,
    /// Diagnostic verbosity
    #[serde(default)]
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: String::new(),
            destination: String::new(),
            audio_device: None,
            event_device: default_event_device(),
            key: default_key_code(),
            mode: OutputMode::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl Config {
    /// Check identifier limits; must pass before the pipeline is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.is_empty() {
            return Err(ConfigError::MissingSource);
        }
        if self.source.len() > MAX_IDENTIFIER_LEN {
            return Err(ConfigError::SourceTooLong(self.source.len()));
        }
        if self.destination.len() > MAX_IDENTIFIER_LEN {
            return Err(ConfigError::DestinationTooLong(self.destination.len()));
        }
        Ok(())
    }

    /// Load and validate a JSON config file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save as pretty-printed JSON, creating parent directories if needed
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), "saved config");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            source: "N0CALL".into(),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert_eq!(valid_config().validate(), Ok(()));
    }

    #[test]
    fn test_source_required() {
        let config = Config::default();
        assert_eq!(config.validate(), Err(ConfigError::MissingSource));
    }

    #[test]
    fn test_source_length_limit() {
        let mut config = valid_config();
        config.source = "WAYTOOLONGCALL".into();
        assert_eq!(config.validate(), Err(ConfigError::SourceTooLong(14)));
    }

    #[test]
    fn test_destination_length_limit() {
        let mut config = valid_config();
        config.destination = "0123456789".into();
        assert_eq!(config.validate(), Err(ConfigError::DestinationTooLong(10)));
    }

    #[test]
    fn test_nine_character_identifiers_accepted() {
        let mut config = valid_config();
        config.source = "ABCDEFGHI".into();
        config.destination = "ABCDEFGHI".into();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, OutputMode::Baseband);
        assert_eq!(config.verbosity, Verbosity::Normal);
        assert_eq!(config.key, DEFAULT_KEY_CODE);
        assert_eq!(config.event_device, DEFAULT_EVENT_DEVICE);
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(Verbosity::Quiet.filter_directive(), "radiomod=error");
        assert_eq!(Verbosity::Debug.filter_directive(), "radiomod=trace");
    }
}
