//! Query attempts, table selections and their outcomes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::table::ResultTable;

/// One generated SQL statement and the label of the table it produces.
///
/// Serialized as a two-element `[sql, label]` array, which is the layout of
/// the persisted question cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Statement {
    /// SQL text
    pub sql: String,

    /// Intended result-table name
    pub label: String,
}

impl Statement {
    /// Create a statement, trimming both parts.
    pub fn new(sql: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            sql: sql.into().trim().to_string(),
            label: label.into().trim().to_string(),
        }
    }
}

impl From<(String, String)> for Statement {
    fn from((sql, label): (String, String)) -> Self {
        Self::new(sql, label)
    }
}

impl From<Statement> for (String, String) {
    fn from(statement: Statement) -> Self {
        (statement.sql, statement.label)
    }
}

/// Stage-1 output: tables the model picked for a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    /// Model's reasoning for the selection
    pub reasoning: String,

    /// Selected table names, in the model's order of preference
    pub tables: Vec<String>,

    /// Column subset for every selected table, drawn from the catalog
    pub columns: BTreeMap<String, Vec<String>>,
}

impl SelectionResult {
    /// Render the selected tables as `TABLE: col1, col2` lines for the stage-2 prompt.
    pub fn describe(&self) -> String {
        self.tables
            .iter()
            .map(|table| {
                let columns = self
                    .columns
                    .get(table)
                    .map(|c| c.join(", "))
                    .unwrap_or_default();
                format!("- {}: [{}]", table, columns)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Stage-2 output: statements to execute plus the reasoning shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAttempt {
    /// Statements in execution order
    pub statements: Vec<Statement>,

    /// Explanation of the extracted data, meant for the end user
    #[serde(default)]
    pub reasoning: String,
}

impl QueryAttempt {
    /// Build an attempt from cached statements (no reasoning attached).
    pub fn from_statements(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            reasoning: String::new(),
        }
    }
}

/// Pipeline stage, used to report where a question gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Table selection (stage 1)
    Selecting,
    /// Code generation and execution (stage 2)
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selecting => write!(f, "table selection"),
            Self::Generating => write!(f, "query generation"),
        }
    }
}

/// Successful answer to a question.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Statements that produced the tables
    pub attempt: QueryAttempt,

    /// One table per statement, in statement order
    pub tables: Vec<ResultTable>,

    /// Whether the statements came from the question cache
    pub from_cache: bool,
}

/// Terminal outcome of one question.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// All statements executed
    Answered(Answer),

    /// The model judged the question non-actionable
    Rejected(String),

    /// Retry budget exhausted
    NoAnswer {
        /// Stage that exhausted its budget
        stage: Stage,
    },
}

impl Outcome {
    /// Returns the answer if there is one.
    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Self::Answered(answer) => Some(answer),
            _ => None,
        }
    }

    /// Split into `(attempt, tables, from_cache)`, all `None` unless answered.
    pub fn into_parts(self) -> (Option<QueryAttempt>, Option<Vec<ResultTable>>, Option<bool>) {
        match self {
            Self::Answered(answer) => (
                Some(answer.attempt),
                Some(answer.tables),
                Some(answer.from_cache),
            ),
            _ => (None, None, None),
        }
    }
}
