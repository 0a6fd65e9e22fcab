//! Stage 2: turn a question and a table selection into SQL statements.

use crate::llm::client::{ChatModel, ChatRequest};
use crate::llm::tags::ModelReply;
use crate::llm::{prompts, StageReply};
use crate::source::SqlDialect;
use crate::types::{QueryAttempt, Result, RetrieverError, SelectionResult};

/// Reply budget for the generation call.
const GENERATION_MAX_TOKENS: u32 = 4000;

/// SQL generator bound to one model and one result-size policy.
pub struct QueryGenerator<'a> {
    model: &'a dyn ChatModel,
    system: String,
}

impl<'a> QueryGenerator<'a> {
    /// Create a generator.
    ///
    /// # Arguments
    ///
    /// * `model` - Chat model
    /// * `dialect` - SQL dialect of the data source the code will run on
    /// * `row_limit` - Default row cap stated in the system role
    /// * `column_limit` - Default column cap stated in the system role
    pub fn new(model: &'a dyn ChatModel, dialect: SqlDialect, row_limit: usize, column_limit: usize) -> Self {
        Self {
            model,
            system: prompts::generation_system(dialect, row_limit, column_limit),
        }
    }

    /// Build the initial stage-2 prompt.
    pub fn prompt(&self, question: &str, selection: &SelectionResult) -> String {
        prompts::generation_prompt(question, selection)
    }

    /// Send `prompt` (initial or corrective) and decode the reply.
    ///
    /// # Errors
    ///
    /// Returns transport errors from the model. Decoding errors, including
    /// `InvalidQuestion` for an `<error>` reply, land in `StageReply::result`.
    pub async fn generate(&self, prompt: &str) -> Result<StageReply<QueryAttempt>> {
        let request = ChatRequest::with_system(self.system.as_str(), GENERATION_MAX_TOKENS).user(prompt);
        let raw = self.model.complete(&request).await?;
        let result = Self::decode(&raw);
        Ok(StageReply { raw, result })
    }

    /// Decode a stage-2 reply.
    pub fn decode(raw: &str) -> Result<QueryAttempt> {
        match ModelReply::decode_plan(raw)? {
            ModelReply::Rejected { message } => Err(RetrieverError::InvalidQuestion(message)),
            ModelReply::QueryPlan { reasoning, statements } => Ok(QueryAttempt { statements, reasoning }),
            other => Err(RetrieverError::parse(format!("unexpected reply: {:?}", other))),
        }
    }
}
