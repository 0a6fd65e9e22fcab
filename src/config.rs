//! Retriever configuration and file locations.

use crate::types::{Result, RetrieverError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "SQLR_DEFAULT_LLM";

/// Environment variable overriding the retry budget.
pub const TRIES_ENV: &str = "SQLR_TRIES";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "~/.sqlr/config.json";

/// Tables always offered to table selection, even when introspection misses them.
pub const ESSENTIAL_TABLES: &[&str] = &[
    "WO_HDR",
    "WO_LINE",
    "SO_HDR",
    "SO_LINE",
    "PO_HDR",
    "PO_LINE",
    "STOCK",
    "STOCKWH",
    "STOCKWHUPD",
    "TKT_LINE",
    "PSHIP_LINE",
    "CLM_LINE",
    "WOMNT_LINE",
    "STOCKWHTRANSFER_LINE",
    "SRCV_LINE",
    "RCV_LINE",
    "RMA_LINE",
    "INSPECTION_BY_ACCOUNT",
    "TBLCODE",
    "CUSTVEND",
    "CUSTVENDSETUP",
    "INSPECTION_BY_VENDOR_RATE",
    "INSEPCTION_BY_PARTNUMBER",
    "WHLIST",
];

/// Retriever settings. Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Model name; also selects the provider
    pub model: String,

    /// Model calls allowed per stage (minimum 1)
    pub tries: u32,

    /// Question cache file
    pub cache_path: String,

    /// Tables pre-seeded into the catalog
    pub essential_tables: Vec<String>,

    /// Table ceiling stated in the selection prompt
    pub max_tables: usize,

    /// Default row cap stated to the generator
    pub row_limit: usize,

    /// Default column cap stated to the generator
    pub column_limit: usize,

    /// Rounding for decimal and real cells
    pub decimal_places: u32,

    /// Rows shown per table by the terminal
    pub preview_rows: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20240620".to_string(),
            tries: 2,
            cache_path: "~/.sqlr/answered_questions.json".to_string(),
            essential_tables: ESSENTIAL_TABLES.iter().map(|t| t.to_string()).collect(),
            max_tables: 5,
            row_limit: 20,
            column_limit: 6,
            decimal_places: 2,
            preview_rows: 5,
        }
    }
}

impl RetrieverConfig {
    /// Load configuration, then apply environment overrides.
    ///
    /// # Arguments
    ///
    /// * `path` - Config file; `None` means `~/.sqlr/config.json`. A missing
    ///   file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::ConfigError` if the file is not valid JSON or an
    /// override does not parse
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => expand_path(DEFAULT_CONFIG_PATH),
        };

        let config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| {
                RetrieverError::ConfigError(format!("Invalid config {}: {}", path.display(), e))
            })?
        } else {
            Self::default()
        };

        config.with_overrides(std::env::var(MODEL_ENV).ok(), std::env::var(TRIES_ENV).ok())
    }

    /// Apply the model and budget overrides, then clamp `tries` to at least 1.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::ConfigError` if `tries` is not a number
    pub fn with_overrides(mut self, model: Option<String>, tries: Option<String>) -> Result<Self> {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        if let Some(tries) = tries {
            self.tries = tries
                .trim()
                .parse()
                .map_err(|_| RetrieverError::ConfigError(format!("{} must be a number, got '{}'", TRIES_ENV, tries)))?;
        }
        self.tries = self.tries.max(1);
        Ok(self)
    }

    /// Cache file with `~` expanded.
    pub fn cache_file(&self) -> PathBuf {
        expand_path(&self.cache_path)
    }
}

/// Expand a leading `~` in a path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
