//! Statement execution and cell normalization.

use crate::source::{DataSource, SqlValue};
use crate::telemetry;
use crate::types::{QueryAttempt, Result, ResultTable, RetrieverError};
use serde_json::Value as JsonValue;
use tracing::Instrument;

/// Result of running every statement of an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// Every statement ran; one table per statement, in order
    Succeeded(Vec<ResultTable>),

    /// Statement `index` failed; nothing from this attempt is kept
    Failed {
        /// Zero-based index of the failing statement
        index: usize,
        /// Driver error text
        error: String,
    },
}

/// Run the statements of `attempt` in order, all or nothing.
///
/// The first failing statement stops execution and every table already
/// materialized is dropped.
///
/// # Arguments
///
/// * `source` - Data source to run against
/// * `attempt` - Statements to run
/// * `decimal_places` - Rounding applied to decimal and real cells
///
/// # Errors
///
/// Returns `RetrieverError::Source` when the connection itself is broken.
/// Statement errors are reported as `Execution::Failed`, not as `Err`.
pub async fn run(source: &dyn DataSource, attempt: &QueryAttempt, decimal_places: u32) -> Result<Execution> {
    let mut tables = Vec::with_capacity(attempt.statements.len());

    for (index, statement) in attempt.statements.iter().enumerate() {
        let span = telemetry::sql_span(source.system(), &statement.label, &statement.sql);

        let rows = match source.query(&statement.sql).instrument(span.clone()).await {
            Ok(rows) => rows,
            Err(e @ RetrieverError::Source(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(index, label = %statement.label, error = %e, "Statement failed");
                return Ok(Execution::Failed {
                    index,
                    error: e.to_string(),
                });
            }
        };

        telemetry::record_rows(&span, rows.rows.len());
        tracing::debug!(index, label = %statement.label, rows = rows.rows.len(), "Statement executed");

        let normalized = rows
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(|v| normalize(v, decimal_places)).collect())
            .collect();
        tables.push(ResultTable::new(statement.label.clone(), rows.columns, normalized));
    }

    Ok(Execution::Succeeded(tables))
}

/// Convert a driver value into a display-ready JSON cell.
///
/// Decimals and reals are rounded to `decimal_places`, blobs become lowercase
/// hex, everything else passes through. A decimal whose text does not parse
/// is kept as a string.
pub fn normalize(value: SqlValue, decimal_places: u32) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => round_number(f, decimal_places),
        SqlValue::Decimal(text) => match text.trim().parse::<f64>() {
            Ok(f) => round_number(f, decimal_places),
            Err(_) => JsonValue::String(text),
        },
        SqlValue::Text(s) => JsonValue::String(s),
        SqlValue::Blob(bytes) => JsonValue::String(bytes.iter().map(|b| format!("{:02x}", b)).collect()),
    }
}

fn round_number(value: f64, decimal_places: u32) -> JsonValue {
    let factor = 10f64.powi(decimal_places as i32);
    let rounded = (value * factor).round() / factor;
    // NaN and infinities have no JSON number form.
    serde_json::Number::from_f64(rounded)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}
