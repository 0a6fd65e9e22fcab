//! Tracing spans for model calls and statement execution.
//!
//! Span attributes follow the OpenTelemetry semantic conventions where one
//! exists (`db.*`, `gen_ai.*`), so an OTLP layer can be added to the
//! subscriber without touching call sites.
//!
//! # Example
//!
//! ```rust,ignore
//! let span = sql_span("sqlite", "work_orders", "SELECT * FROM WO_HDR LIMIT 20");
//! let _guard = span.enter();
//! let rows = source.query(sql).await?;
//! record_rows(&span, rows.rows.len());
//! ```

use tracing::field::Empty;
use tracing::{span, Level, Span};

/// Pipeline step a model call belongs to (maps to `retriever.stage`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Cached question similarity
    Similarity,
    /// Stage 1
    TableSelection,
    /// Stage 2
    QueryGeneration,
    /// Question rewrite after an unsatisfactory answer
    Reformulation,
}

impl StageKind {
    /// Get stage name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::TableSelection => "table_selection",
            Self::QueryGeneration => "query_generation",
            Self::Reformulation => "reformulation",
        }
    }
}

/// Create a span for one chat completion.
///
/// # Arguments
///
/// * `provider` - Provider name (`gen_ai.system`)
/// * `model` - Requested model (`gen_ai.request.model`)
/// * `max_tokens` - Reply limit (`gen_ai.request.max_tokens`)
pub fn llm_span(provider: &str, model: &str, max_tokens: u32) -> Span {
    span!(
        Level::INFO,
        "llm.chat",
        otel.name = %format!("chat {}", model),
        otel.kind = "client",
        gen_ai.system = provider,
        gen_ai.request.model = model,
        gen_ai.request.max_tokens = max_tokens,
    )
}

/// Create a span for one pipeline stage.
///
/// `retriever.attempt` is recorded per model call with [`record_attempt`].
pub fn stage_span(stage: StageKind) -> Span {
    span!(
        Level::INFO,
        "retriever.stage",
        otel.name = stage.as_str(),
        otel.kind = "internal",
        retriever.stage = stage.as_str(),
        retriever.attempt = Empty,
    )
}

/// Create a span for one generated statement.
///
/// # Arguments
///
/// * `system` - Data source backend (`db.system.name`)
/// * `label` - Result-table label (`db.collection.name`)
/// * `query_text` - Statement text (`db.query.text`)
pub fn sql_span(system: &str, label: &str, query_text: &str) -> Span {
    span!(
        Level::INFO,
        "db.query",
        otel.name = %format!("query {}", label),
        otel.kind = "client",
        db.system.name = system,
        db.operation.name = "query",
        db.collection.name = label,
        db.query.text = query_text,
        db.response.returned_rows = Empty,
    )
}

/// Record the number of rows a statement returned.
pub fn record_rows(span: &Span, rows: usize) {
    span.record("db.response.returned_rows", rows);
}

/// Record which attempt (1-based) a stage is on.
pub fn record_attempt(span: &Span, attempt: u32) {
    span.record("retriever.attempt", attempt);
}
