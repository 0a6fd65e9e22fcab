//! Question rewrite after the user rejects an answer.

use crate::llm::client::{ChatModel, ChatRequest};
use crate::llm::prompts;
use crate::llm::tags::{self, tag};
use crate::telemetry::{self, StageKind};
use crate::types::{Result, RetrieverError};
use tracing::Instrument;

const REFORMULATE_MAX_TOKENS: u32 = 200;

/// Ask the model to rewrite `question` given the user's `explanation`.
///
/// # Errors
///
/// Returns `MissingTag` if the reply has no `<new_question>`, `ParseFailure`
/// if it is empty, or a transport error from the model
pub async fn reformulate_question(model: &dyn ChatModel, question: &str, explanation: &str) -> Result<String> {
    let span = telemetry::stage_span(StageKind::Reformulation);

    async {
        let request = ChatRequest::bare(REFORMULATE_MAX_TOKENS).user(prompts::reformulate_prompt(question, explanation));
        let reply = model.complete(&request).await?;
        let rewritten = tags::extract(&reply, tag::NEW_QUESTION)?;
        if rewritten.is_empty() {
            return Err(RetrieverError::parse("<new_question> is empty"));
        }
        tracing::info!(original = question, rewritten, "Question reformulated");
        Ok::<_, RetrieverError>(rewritten.to_string())
    }
    .instrument(span)
    .await
}
