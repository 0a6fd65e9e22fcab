//! Language model access and the two model-backed pipeline stages.
//!
//! [`client`] holds the chat interface and its HTTP transport, [`tags`]
//! decodes the tag protocol, [`prompts`] holds every template, and
//! [`selector`] / [`generator`] wrap one model call each.

pub mod client;
pub mod generator;
pub mod prompts;
pub mod reformulate;
pub mod selector;
pub mod tags;

pub use client::{ChatMessage, ChatModel, ChatRequest, LlmClient, LlmProvider, Role};
pub use generator::QueryGenerator;
pub use reformulate::reformulate_question;
pub use selector::TableSelector;
pub use tags::ModelReply;

use crate::types::Result;

/// Raw model reply paired with its decoded value.
///
/// The raw text is kept so a failed decode (or a failed execution) can be
/// quoted back to the model in a corrective prompt.
#[derive(Debug)]
pub struct StageReply<T> {
    /// Reply text as returned by the model
    pub raw: String,

    /// Decoded value or the decoding error
    pub result: Result<T>,
}
