//! Pipeline configuration.
//!
//! Stored as a TOML file. Every field has a default matching the daily
//! production job, so an empty file is a valid configuration:
//!
//! ```toml
//! symbols = ["AVGO", "NVDA"]
//! lookback_days = 180
//! target_table = "raw.lab1_market_data"
//! database = "marketload.duckdb"
//! staging_dir = "staging"
//! batch_size = 500
//! ```

use crate::load::TableName;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Run parameters for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Instruments to extract. Order is preserved in the staging artifact.
    pub symbols: Vec<String>,
    /// Lookback window in calendar days, ending on the run date.
    pub lookback_days: u32,
    /// Target table, optionally schema-qualified (`schema.table`).
    pub target_table: String,
    /// DuckDB database file holding the target table.
    pub database: PathBuf,
    /// Directory for staging and canonical artifacts.
    pub staging_dir: PathBuf,
    /// Rows per INSERT statement during the load.
    pub batch_size: usize,
    /// Ticker bound to a flat (single-instrument) staging artifact.
    ///
    /// When unset and exactly one symbol is configured, the runner uses that
    /// symbol. Otherwise flat rows fall back to the `UNKNOWN` placeholder.
    pub flat_ticker: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["AVGO".into(), "NVDA".into()],
            lookback_days: 180,
            target_table: "raw.lab1_market_data".into(),
            database: PathBuf::from("marketload.duckdb"),
            staging_dir: PathBuf::from("staging"),
            batch_size: 500,
            flat_ticker: None,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check run parameters before any stage touches the network or warehouse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("at least one symbol is required".into()));
        }
        let mut seen = HashSet::new();
        for sym in &self.symbols {
            if sym.trim().is_empty() {
                return Err(ConfigError::Invalid("symbols must not be blank".into()));
            }
            if !seen.insert(sym.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate symbol '{sym}'")));
            }
        }
        if self.lookback_days == 0 {
            return Err(ConfigError::Invalid("lookback_days must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        self.table()?;
        Ok(())
    }

    /// The validated target table identifier.
    pub fn table(&self) -> Result<TableName, ConfigError> {
        TableName::parse(&self.target_table).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Ticker to bind to flat staging rows, if one is known.
    pub fn resolved_flat_ticker(&self) -> Option<&str> {
        match (&self.flat_ticker, self.symbols.as_slice()) {
            (Some(t), _) => Some(t.as_str()),
            (None, [only]) => Some(only.as_str()),
            _ => None,
        }
    }
}
