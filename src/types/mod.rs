//! Core data types for the retriever.
//!
//! Defines fundamental types used throughout the system:
//! - `Statement` / `QueryAttempt`: generated SQL and its labels
//! - `SelectionResult`: tables picked by the first model stage
//! - `ResultTable`: normalized output of one statement
//! - `Outcome`: terminal result of a question
//! - `RetrieverError`: error types for all operations

pub mod error;
pub mod query;
pub mod table;

pub use error::{Result, RetrieverError};
pub use query::{Answer, Outcome, QueryAttempt, SelectionResult, Stage, Statement};
pub use table::ResultTable;
