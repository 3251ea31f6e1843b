//! Configuration module for the CODA decoder
//!
//! Settings are loaded from a TOML file. Every field has a default, so an
//! empty file (or no file at all) yields the standard decoder behavior.
//!
//! # Example
//! ```ignore
//! let config = Config::load("decoder.toml")?;
//! let decoder = CodaDecoder::new(config.decoder.clone());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::evio::ByteOrder;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub input: InputConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.decoder.validate()?;
        Ok(config)
    }
}

/// Decoder behavior settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DecoderConfig {
    /// Allowed TI timestamp deviation between crates (clock ticks).
    /// The master crate is allowed one extra tick.
    #[serde(default)]
    pub timestamp_tolerance: u64,

    /// Number of timestamp mismatch warnings logged before suppression
    #[serde(default = "default_max_timestamp_warnings")]
    pub max_timestamp_warnings: u32,

    /// Legacy packed FADC channels with this many samples or fewer are dropped
    #[serde(default = "default_fadc_min_samples")]
    pub fadc_min_samples: usize,
}

fn default_max_timestamp_warnings() -> u32 {
    100
}

fn default_fadc_min_samples() -> usize {
    18
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance: 0,
            max_timestamp_warnings: default_max_timestamp_warnings(),
            fadc_min_samples: default_fadc_min_samples(),
        }
    }
}

impl DecoderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timestamp_tolerance > crate::common::TIMESTAMP_MASK {
            return Err(ConfigError::InvalidValue {
                field: "decoder.timestamp_tolerance".to_string(),
                reason: "exceeds the 48-bit timestamp range".to_string(),
            });
        }
        Ok(())
    }
}

/// Input stream settings (used by the command-line tools)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Byte order of the event buffers
    #[serde(default)]
    pub byte_order: ByteOrder,

    /// Stop after this many events
    #[serde(default)]
    pub max_events: Option<u64>,
}
