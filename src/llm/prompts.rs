//! Prompt templates for every model call.
//!
//! Replies are decoded by [`crate::llm::tags`], so each template spells out
//! the exact tags it expects back.

use crate::source::SqlDialect;
use crate::types::SelectionResult;

/// Reply the similarity prompt asks for when nothing matches.
pub const NO_SIMILAR_QUESTION: &str = "No similar question found.";

/// System role of the table-selection stage.
pub const SELECTION_SYSTEM: &str = "You are an AI assistant tasked with analyzing a user's question about a database, \
determining its validity, and identifying relevant tables if the question is valid.";

/// System role of the code-generation stage, with the default result-size policy.
pub fn generation_system(dialect: SqlDialect, row_limit: usize, column_limit: usize) -> String {
    format!(
        "You are a SQL coder writing for {name}. Be sure that the code you generate runs on {name}; to cap \
the number of rows use {limit}. Unless the question explicitly asks otherwise, retrieve at most {rows} rows and \
limit yourself to the {columns} most important columns. Only reference columns that belong to the tables you \
are given. If the question has no plausible mapping to the given tables and columns, answer only with an \
<error> tag explaining why.",
        name = dialect.name(),
        limit = dialect.row_limit_clause(),
        rows = row_limit,
        columns = column_limit,
    )
}

/// Stage-1 prompt: the question plus every table name in the catalog.
pub fn selection_prompt(question: &str, table_names: &[&str], max_tables: usize) -> String {
    format!(
        r#"Here is the user's question:
<question>
{question}
</question>

Here is the list of tables available in the database:
<table_list>
{tables}
</table_list>

First decide whether the question asks for information that could be retrieved from these tables.
If it does not (for example it is small talk, asks about the weather, or asks you to modify data),
answer only with:
<error>A short, polite explanation for the user of why the question cannot be answered from the database.</error>

Otherwise choose up to {max_tables} tables that are most relevant to the question, using only names that
appear in the table list exactly as written, and answer in this format:
<reasoning>Why these tables hold the requested information.</reasoning>
<tables>[TABLE_NAME1, TABLE_NAME2, ...]</tables>"#,
        question = question,
        tables = table_names.join(", "),
        max_tables = max_tables,
    )
}

/// Stage-2 prompt: the question, the selected tables with their columns, and the stage-1 reasoning.
pub fn generation_prompt(question: &str, selection: &SelectionResult) -> String {
    format!(
        r#"Here is the user's question:
<question>
{question}
</question>

These tables were selected as relevant, with their columns:
<table_info>
{tables}
</table_info>

This is why they were selected:
<selection_reasoning>
{reasoning}
</selection_reasoning>

Write the SQL needed to answer the question. You may return several statements when the answer is best
shown as several tables. Answer in this format:
<user_reasoning>A short explanation for the user of what data you are extracting.</user_reasoning>
<code>STATEMENT_1 ##D## STATEMENT_2</code>
<tablename>label_for_statement_1, label_for_statement_2</tablename>

Separate statements with ##D## only, without markdown, and give exactly one short snake_case label per
statement in <tablename>, in the same order."#,
        question = question,
        tables = selection.describe(),
        reasoning = selection.reasoning,
    )
}

/// Corrective prompt after a stage-1 reply could not be used.
pub fn selection_fix(main_prompt: &str, response: &str, error: &str) -> String {
    format!(
        r#"Last time I gave you the following prompt:
{main_prompt}
You returned:
{response}
I got this message while trying to find the tables:
{error}
Fix your answer so it will work. Check that every table you name exists in the table list given to you.
Return the same format, and write your <reasoning> as if you never made a mistake in the first place."#
    )
}

/// Corrective prompt after a stage-2 reply could not be decoded.
pub fn generation_parse_fix(main_prompt: &str, response: &str, error: &str) -> String {
    format!(
        r#"Last time I gave you the following prompt:
{main_prompt}
You returned:
{response}
I could not read your answer:
{error}
Return the same answer in exactly the requested format: <user_reasoning>, <code> with statements separated
by ##D##, and <tablename> with one label per statement."#
    )
}

/// Corrective prompt after statement `index` failed to execute.
pub fn execution_fix(main_prompt: &str, response: &str, index: usize, failure: &str) -> String {
    format!(
        r#"Last time I gave you the following prompt:
{main_prompt}
You returned:
{response}
I got this message while running the code (statements are counted from 0):
{failure}
Fix the code so it will work, and also check the statements after statement {index}.
Return the same format, and write your <user_reasoning> as if you never made a mistake in the first place.
Remember to adjust the table labels if needed."#
    )
}

/// Prompt asking which stored question, if any, matches a new one.
pub fn similar_question_prompt(question: &str, stored: &[&str]) -> String {
    let list = stored
        .iter()
        .map(|q| format!("- {}", q))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"A user asked:
"{question}"

These questions have already been answered:
{list}

If one of them asks for exactly the same data (same filters, same time frame, same entities), reply with that
question copied verbatim and nothing else. Otherwise reply with exactly:
{sentinel}"#,
        sentinel = NO_SIMILAR_QUESTION,
    )
}

/// Prompt asking the model to rewrite a question the user was unhappy with.
pub fn reformulate_prompt(question: &str, explanation: &str) -> String {
    format!(
        r#"The user asked the following question: "{question}"
The provided answer was not satisfactory. The user explained: "{explanation}"
Please reformulate the original question to address the user's concerns and expectations.
Return the reformulated question inside <new_question> tags (VERY IMPORTANT)."#
    )
}
