//! Normalized tabular output of an executed statement.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Result of one statement, paired with the label the model assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Table label
    pub name: String,

    /// Column names, in select-list order
    pub columns: Vec<String>,

    /// Rows of normalized cell values
    pub rows: Vec<Vec<JsonValue>>,
}

impl ResultTable {
    /// Create a result table.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows.
    pub fn preview(&self, n: usize) -> &[Vec<JsonValue>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Render the first `max_rows` rows as an aligned plain-text grid.
    pub fn to_text(&self, max_rows: usize) -> String {
        let rows: Vec<Vec<String>> = self
            .preview(max_rows)
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }

        let separator = widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+");
        let separator = format!("+{}+", separator);

        let line = |cells: &[String]| {
            let body = cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!(" {:<width$} ", cell, width = width))
                .collect::<Vec<_>>()
                .join("|");
            format!("|{}|", body)
        };

        let mut out = vec![separator.clone(), line(&self.columns), separator.clone()];
        out.extend(rows.iter().map(|row| line(row)));
        out.push(separator);
        out.join("\n")
    }
}

/// Display form of a cell; strings are shown without quotes.
pub fn cell_text(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
