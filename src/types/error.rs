//! Error types for retriever operations.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `From` implementations.

use thiserror::Error;

/// Comprehensive error type for all retriever operations.
///
/// Recoverable variants (see [`RetrieverError::is_recoverable`]) are folded
/// into corrective prompts by the repair loop and never reach the caller.
#[derive(Error, Debug)]
pub enum RetrieverError {
    /// Schema introspection failed
    #[error("Schema catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The model judged the question non-actionable
    #[error("Question rejected: {0}")]
    InvalidQuestion(String),

    /// A required tag was absent from a model reply
    #[error("Missing <{0}> tag in model response")]
    MissingTag(String),

    /// A model reply could not be decoded
    #[error("Failed to parse model response: {0}")]
    ParseFailure(String),

    /// The model named a table that is not in the catalog
    #[error("Table '{0}' does not exist in the catalog")]
    UnknownTable(String),

    /// A generated statement failed against the database
    #[error("Statement {index} failed: {message}")]
    Execution {
        /// Zero-based position of the failing statement
        index: usize,
        /// Error text reported by the data source
        message: String,
    },

    /// LLM transport or API failure
    #[error("LLM request failed: {0}")]
    LlmError(String),

    /// Data source connection failure (not a statement error)
    #[error("Data source error: {0}")]
    Source(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Export operation failed
    #[error("Export failed: {0}")]
    ExportError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// SQLite driver error
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// CSV writer error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
}

impl RetrieverError {
    /// Create a parse failure with context.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseFailure(msg.into())
    }

    /// Create a missing-tag error for `tag`.
    pub fn missing_tag(tag: impl Into<String>) -> Self {
        Self::MissingTag(tag.into())
    }

    /// Check if error is recoverable by re-prompting the model.
    ///
    /// # Returns
    ///
    /// `true` for malformed replies and statement failures, `false` for
    /// rejections, transport failures and everything else
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MissingTag(_)
                | Self::ParseFailure(_)
                | Self::UnknownTable(_)
                | Self::Execution { .. }
        )
    }
}

/// Convenient result type alias.
pub type Result<T> = std::result::Result<T, RetrieverError>;
