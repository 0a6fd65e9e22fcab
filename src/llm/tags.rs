//! Tag protocol decoding for model replies.
//!
//! Every structured reply wraps its fields in XML-like tags
//! (`<reasoning>`, `<tables>`, `<code>`, ...). [`extract`] pulls one field out
//! and fails with `MissingTag` when a delimiter is absent; [`ModelReply`]
//! decodes a whole reply into a typed variant.

use crate::types::{Result, RetrieverError, Statement};

/// Separator between statements inside `<code>`.
pub const STATEMENT_DELIMITER: &str = "##D##";

/// Tag names used by the protocol.
pub mod tag {
    pub const REASONING: &str = "reasoning";
    pub const TABLES: &str = "tables";
    pub const ERROR: &str = "error";
    pub const CODE: &str = "code";
    pub const TABLENAME: &str = "tablename";
    pub const USER_REASONING: &str = "user_reasoning";
    pub const NEW_QUESTION: &str = "new_question";
}

/// Return the text between the first `<tag>` and the first `</tag>` after it, trimmed.
///
/// # Errors
///
/// Returns `RetrieverError::MissingTag` if either delimiter is absent
///
/// # Examples
///
/// ```
/// use sql_retriever::llm::tags::extract;
///
/// assert_eq!(extract("<tables>[A, B]</tables>", "tables").unwrap(), "[A, B]");
/// assert!(extract("no tags here", "error").is_err());
/// ```
pub fn extract<'a>(text: &'a str, tag: &str) -> Result<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let start = text
        .find(&open)
        .map(|i| i + open.len())
        .ok_or_else(|| RetrieverError::missing_tag(tag))?;
    let len = text[start..]
        .find(&close)
        .ok_or_else(|| RetrieverError::missing_tag(tag))?;

    Ok(text[start..start + len].trim())
}

/// Whether the opening delimiter of `tag` appears in `text`.
pub fn has_tag(text: &str, tag: &str) -> bool {
    text.contains(&format!("<{}>", tag))
}

/// Decode a `<tables>` payload such as `[WO_HDR, 'WO_LINE']` into names.
///
/// # Errors
///
/// Returns `RetrieverError::ParseFailure` if no table name remains
pub fn parse_table_list(payload: &str) -> Result<Vec<String>> {
    let inner = payload.trim().trim_start_matches('[').trim_end_matches(']');

    let tables: Vec<String> = inner
        .split(',')
        .map(|name| {
            name.trim_matches(|c: char| c.is_whitespace() || matches!(c, '\'' | '"' | '`' | '[' | ']'))
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect();

    if tables.is_empty() {
        return Err(RetrieverError::parse("the <tables> list is empty"));
    }
    Ok(tables)
}

/// Pair `<code>` statements with `<tablename>` labels.
///
/// # Errors
///
/// Returns `RetrieverError::ParseFailure` if a statement is empty or the two
/// lists differ in length
pub fn parse_statements(code: &str, labels: &str) -> Result<Vec<Statement>> {
    // Brackets are only stripped from labels: T-SQL quotes identifiers as `[NAME]`.
    let sql: Vec<String> = code
        .split(STATEMENT_DELIMITER)
        .map(|s| s.trim().to_string())
        .collect();
    let labels: Vec<String> = labels
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|s| s.trim().trim_matches(|c: char| c == '\'' || c == '"').to_string())
        .collect();

    if sql.iter().any(String::is_empty) {
        return Err(RetrieverError::parse("the <code> block contains an empty statement"));
    }
    if sql.len() != labels.len() {
        return Err(RetrieverError::parse(format!(
            "<code> has {} statements but <tablename> has {} labels",
            sql.len(),
            labels.len()
        )));
    }

    Ok(sql
        .into_iter()
        .zip(labels)
        .enumerate()
        .map(|(i, (sql, label))| {
            let label = if label.is_empty() { format!("table_{}", i + 1) } else { label };
            Statement::new(sql, label)
        })
        .collect())
}

/// Typed view of a model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// `<error>`: the question is not a data-retrieval request
    Rejected {
        /// Explanation for the user
        message: String,
    },

    /// Stage-1 reply: `<reasoning>` + `<tables>`
    TableSelection {
        /// Why these tables were picked
        reasoning: String,
        /// Table names in preference order
        tables: Vec<String>,
    },

    /// Stage-2 reply: `<user_reasoning>` + `<code>` + `<tablename>`
    QueryPlan {
        /// Explanation of the extracted data
        reasoning: String,
        /// Statements with their labels
        statements: Vec<Statement>,
    },
}

impl ModelReply {
    /// Decode a stage-1 reply.
    ///
    /// # Errors
    ///
    /// Returns `MissingTag` or `ParseFailure` for malformed replies
    pub fn decode_selection(text: &str) -> Result<Self> {
        if let Some(rejected) = Self::rejection(text) {
            return Ok(rejected);
        }

        Ok(Self::TableSelection {
            reasoning: extract(text, tag::REASONING)?.to_string(),
            tables: parse_table_list(extract(text, tag::TABLES)?)?,
        })
    }

    /// Decode a stage-2 reply.
    ///
    /// `<user_reasoning>` is optional; `<code>` and `<tablename>` are required.
    ///
    /// # Errors
    ///
    /// Returns `MissingTag` or `ParseFailure` for malformed replies
    pub fn decode_plan(text: &str) -> Result<Self> {
        if let Some(rejected) = Self::rejection(text) {
            return Ok(rejected);
        }

        let reasoning = extract(text, tag::USER_REASONING)
            .map(str::to_string)
            .unwrap_or_default();
        let statements = parse_statements(extract(text, tag::CODE)?, extract(text, tag::TABLENAME)?)?;

        Ok(Self::QueryPlan { reasoning, statements })
    }

    /// `<error>` wins over every other tag. An unterminated `<error>` still
    /// counts as a rejection, with everything after the opening tag as message.
    fn rejection(text: &str) -> Option<Self> {
        if !has_tag(text, tag::ERROR) {
            return None;
        }

        let message = match extract(text, tag::ERROR) {
            Ok(message) => message.to_string(),
            Err(_) => text
                .split_once("<error>")
                .map(|(_, rest)| rest.trim().to_string())
                .unwrap_or_default(),
        };
        Some(Self::Rejected { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_exact() {
        assert_eq!(extract("<tables>[A, B]</tables>", "tables").unwrap(), "[A, B]");
        assert_eq!(
            extract("pre <reasoning>\n  because\n</reasoning> post", "reasoning").unwrap(),
            "because"
        );
    }

    #[test]
    fn test_extract_missing_delimiters_fail() {
        let err = extract("nothing to see", "error").unwrap_err();
        assert!(matches!(err, RetrieverError::MissingTag(ref t) if t == "error"));

        assert!(extract("<code>SELECT 1", "code").is_err());
        assert!(extract("SELECT 1</code>", "code").is_err());
    }

    #[test]
    fn test_extract_closing_before_opening() {
        // A stray closing tag ahead of the opening one must not produce a reversed slice.
        let text = "</code> noise <code>SELECT 1</code>";
        assert_eq!(extract(text, "code").unwrap(), "SELECT 1");
    }

    #[test]
    fn test_parse_table_list_strips_quotes() {
        let tables = parse_table_list("['WO_HDR', \"WO_LINE\" , `STOCK`]").unwrap();
        assert_eq!(tables, vec!["WO_HDR", "WO_LINE", "STOCK"]);

        assert!(parse_table_list("[]").is_err());
        assert!(parse_table_list(" [ , ] ").is_err());
    }

    #[test]
    fn test_parse_statements_pairs_labels() {
        let statements = parse_statements(
            "SELECT TOP 20 * FROM WO_HDR ##D## SELECT COUNT(*) FROM WO_LINE",
            "work_orders, line_count",
        )
        .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], Statement::new("SELECT TOP 20 * FROM WO_HDR", "work_orders"));
        assert_eq!(statements[1].label, "line_count");
    }

    #[test]
    fn test_parse_statements_keeps_bracketed_identifiers() {
        let statements = parse_statements("SELECT [WO_NO] FROM [WO_HDR]", "[work_orders]").unwrap();
        assert_eq!(statements[0].sql, "SELECT [WO_NO] FROM [WO_HDR]");
        assert_eq!(statements[0].label, "work_orders");
    }

    #[test]
    fn test_parse_statements_length_mismatch() {
        let err = parse_statements("SELECT 1 ##D## SELECT 2", "only_one").unwrap_err();
        assert!(matches!(err, RetrieverError::ParseFailure(_)));

        assert!(parse_statements("SELECT 1 ##D##", "a, b").is_err());
    }

    #[test]
    fn test_decode_selection() {
        let reply = "<reasoning>Work orders live in WO_HDR.</reasoning>\n<tables>[WO_HDR]</tables>";
        assert_eq!(
            ModelReply::decode_selection(reply).unwrap(),
            ModelReply::TableSelection {
                reasoning: "Work orders live in WO_HDR.".to_string(),
                tables: vec!["WO_HDR".to_string()],
            }
        );
    }

    #[test]
    fn test_decode_error_wins() {
        let reply = "<reasoning>x</reasoning><error>Not a database question.</error>";
        assert_eq!(
            ModelReply::decode_selection(reply).unwrap(),
            ModelReply::Rejected { message: "Not a database question.".to_string() }
        );

        let unterminated = "<error>The weather is not stored here";
        assert!(matches!(
            ModelReply::decode_plan(unterminated).unwrap(),
            ModelReply::Rejected { ref message } if message == "The weather is not stored here"
        ));
    }

    #[test]
    fn test_decode_plan_missing_code() {
        let reply = "<user_reasoning>x</user_reasoning><tablename>a</tablename>";
        let err = ModelReply::decode_plan(reply).unwrap_err();
        assert!(matches!(err, RetrieverError::MissingTag(ref t) if t == "code"));
    }

    #[test]
    fn test_decode_plan_without_user_reasoning() {
        let reply = "<code>SELECT 1</code><tablename>one</tablename>";
        match ModelReply::decode_plan(reply).unwrap() {
            ModelReply::QueryPlan { reasoning, statements } => {
                assert!(reasoning.is_empty());
                assert_eq!(statements, vec![Statement::new("SELECT 1", "one")]);
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn prop_extract_returns_trimmed_payload(payload in "[A-Za-z0-9_ ,\\[\\]]{0,40}") {
            let text = format!("noise <tables>{}</tables> tail", payload);
            prop_assert_eq!(extract(&text, "tables").unwrap(), payload.trim());
        }

        #[test]
        fn prop_extract_without_tag_always_fails(text in "[^<>]{0,80}") {
            prop_assert!(extract(&text, "error").is_err());
        }
    }
}
