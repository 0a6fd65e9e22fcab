//! Stage 1: pick the tables relevant to a question.

use crate::catalog::SchemaCatalog;
use crate::llm::client::{ChatModel, ChatRequest};
use crate::llm::tags::ModelReply;
use crate::llm::{prompts, StageReply};
use crate::types::{Result, RetrieverError, SelectionResult};
use std::collections::BTreeMap;

/// Reply budget for the selection call.
const SELECTION_MAX_TOKENS: u32 = 1500;

/// Table selector bound to one model and one catalog.
pub struct TableSelector<'a> {
    model: &'a dyn ChatModel,
    catalog: &'a SchemaCatalog,
}

impl<'a> TableSelector<'a> {
    /// Create a selector.
    pub fn new(model: &'a dyn ChatModel, catalog: &'a SchemaCatalog) -> Self {
        Self { model, catalog }
    }

    /// Build the initial stage-1 prompt for `question`.
    pub fn prompt(&self, question: &str, max_tables: usize) -> String {
        prompts::selection_prompt(question, &self.catalog.table_names(), max_tables)
    }

    /// Send `prompt` (initial or corrective) and decode the reply.
    ///
    /// # Returns
    ///
    /// The raw reply plus the decoded selection, or the decoding error:
    /// `InvalidQuestion` for an `<error>` reply, `MissingTag`/`ParseFailure`
    /// for malformed replies, `UnknownTable` for names outside the catalog
    ///
    /// # Errors
    ///
    /// Returns transport errors from the model
    pub async fn select(&self, prompt: &str) -> Result<StageReply<SelectionResult>> {
        let request = ChatRequest::with_system(prompts::SELECTION_SYSTEM, SELECTION_MAX_TOKENS).user(prompt);
        let raw = self.model.complete(&request).await?;
        let result = self.decode(&raw);
        Ok(StageReply { raw, result })
    }

    /// Decode a stage-1 reply against the catalog.
    pub fn decode(&self, raw: &str) -> Result<SelectionResult> {
        let (reasoning, names) = match ModelReply::decode_selection(raw)? {
            ModelReply::Rejected { message } => return Err(RetrieverError::InvalidQuestion(message)),
            ModelReply::TableSelection { reasoning, tables } => (reasoning, tables),
            other => return Err(RetrieverError::parse(format!("unexpected reply: {:?}", other))),
        };

        let mut tables = Vec::with_capacity(names.len());
        let mut columns = BTreeMap::new();
        for name in names {
            let table_columns = self
                .catalog
                .columns(&name)
                .ok_or_else(|| RetrieverError::UnknownTable(name.clone()))?;
            if !columns.contains_key(&name) {
                columns.insert(name.clone(), table_columns.to_vec());
                tables.push(name);
            }
        }

        Ok(SelectionResult {
            reasoning,
            tables,
            columns,
        })
    }
}
