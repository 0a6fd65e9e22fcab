//! Data source abstraction.
//!
//! The retriever only needs two things from a database: the `(table, column)`
//! pairs of the active schema and the ability to run an arbitrary statement
//! and read back column names plus typed rows.

pub mod sqlite;

pub use sqlite::SqliteSource;

use crate::types::Result;
use async_trait::async_trait;

/// Raw cell value as reported by the driver, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Integer value
    Integer(i64),
    /// Floating point value
    Real(f64),
    /// Fixed-point value (DECIMAL/NUMERIC/MONEY columns), kept as text
    Decimal(String),
    /// Text value
    Text(String),
    /// Binary value
    Blob(Vec<u8>),
}

/// SQL flavour a data source accepts, stated to the model when it writes code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// SQLite (`LIMIT n`)
    Sqlite,
    /// Microsoft SQL Server (`SELECT TOP n`)
    MsSql,
}

impl SqlDialect {
    /// Product name used in prompts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::MsSql => "Microsoft SQL Server",
        }
    }

    /// How the dialect caps the number of returned rows.
    pub fn row_limit_clause(&self) -> &'static str {
        match self {
            Self::Sqlite => "a LIMIT clause at the end of the query (never SELECT TOP)",
            Self::MsSql => "SELECT TOP n (never LIMIT)",
        }
    }
}

/// Column names and rows returned by one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRows {
    /// Column names in select-list order
    pub columns: Vec<String>,

    /// Row tuples, each aligned with `columns`
    pub rows: Vec<Vec<SqlValue>>,
}

/// Database interface consumed by the catalog and the executor.
///
/// A broken connection must be reported as
/// [`RetrieverError::Source`](crate::types::RetrieverError::Source); every
/// other error from [`DataSource::query`] is treated as a statement failure.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// List every `(table, column)` pair in the active schema.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata introspection fails
    async fn columns(&self) -> Result<Vec<(String, String)>>;

    /// Execute one statement and materialize its rows.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the statement fails
    async fn query(&self, sql: &str) -> Result<RawRows>;

    /// Short name of the backend, used in spans.
    fn system(&self) -> &'static str;

    /// SQL dialect generated statements must be written in.
    fn dialect(&self) -> SqlDialect;
}
