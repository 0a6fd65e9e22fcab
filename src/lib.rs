//! SQL Retriever - natural-language questions answered from a relational database
//!
//! A question goes through:
//! - a cache check against previously answered questions
//! - table selection by a language model, constrained to the schema catalog
//! - SQL generation for the selected tables
//! - execution, with failures fed back to the model as corrective prompts
//!
//! ```rust,ignore
//! let config = RetrieverConfig::load(None)?;
//! let model = Arc::new(LlmClient::from_env(&config.model)?);
//! let source = Arc::new(SqliteSource::open("erp.db")?);
//! let retriever = Retriever::connect(model, source, config).await?;
//!
//! if let Outcome::Answered(answer) = retriever.apply("Show the latest work orders", &AlwaysAccept).await? {
//!     for table in &answer.tables {
//!         println!("{}", table.to_text(5));
//!     }
//! }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod executor;
pub mod export;
pub mod llm;
pub mod logging;
pub mod retriever;
pub mod source;
pub mod telemetry;
pub mod types;

pub use cache::QuestionCache;
pub use catalog::SchemaCatalog;
pub use config::RetrieverConfig;
pub use executor::Execution;
pub use llm::{ChatModel, ChatRequest, LlmClient};
pub use retriever::{AlwaysAccept, AlwaysDecline, Confirm, Retriever};
pub use source::{DataSource, SqlDialect, SqliteSource};
pub use types::{Answer, Outcome, QueryAttempt, Result, ResultTable, RetrieverError, SelectionResult, Stage, Statement};
