//! Chat interface to the language model and its HTTP transport.

use crate::telemetry;
use crate::types::{Result, RetrieverError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::Instrument;

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user turn
    User,
    /// Model turn
    Assistant,
}

/// One prior or current turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Turn author
    pub role: Role,

    /// Turn text
    pub content: String,
}

/// Request sent to the model: task instructions, prior turns, and the user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// System role (task instructions)
    pub system: Option<String>,

    /// Ordered turns, ending with the user turn
    pub messages: Vec<ChatMessage>,

    /// Upper bound on reply length
    pub max_tokens: u32,
}

impl ChatRequest {
    /// Start a request with a system role.
    pub fn with_system(system: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: Some(system.into()),
            messages: Vec::new(),
            max_tokens,
        }
    }

    /// Start a request without a system role.
    pub fn bare(max_tokens: u32) -> Self {
        Self {
            system: None,
            messages: Vec::new(),
            max_tokens,
        }
    }

    /// Append a user turn.
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.into(),
        });
        self
    }

    /// Text of the last user turn.
    pub fn last_user(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Model chat interface consumed by every stage.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a request and return the reply text.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::LlmError` on transport or API failure
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    /// Model identifier, for logs and spans.
    fn model(&self) -> &str;
}

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
    Cerebras,
}

impl LlmProvider {
    /// Pick the provider from the model name.
    pub fn for_model(model: &str) -> Self {
        if model.starts_with("claude") || model.starts_with("anthropic") {
            LlmProvider::Anthropic
        } else if model.starts_with("cerebras") || model.starts_with("llama") || model.starts_with("qwen") {
            LlmProvider::Cerebras
        } else {
            LlmProvider::OpenAI
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Cerebras => "CEREBRAS_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

/// OpenAI-compatible chat completion response.
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: String,
}

/// Anthropic API response.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

/// HTTP client for the Anthropic, OpenAI and Cerebras chat APIs.
pub struct LlmClient {
    api_key: String,
    model: String,
    provider: LlmProvider,
    client: Client,
}

impl LlmClient {
    /// Create new client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - API key for the provider implied by `model`
    /// * `model` - Model name (e.g., "claude-3-5-sonnet-20240620", "gpt-4o")
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::LlmError` if the HTTP client cannot be built
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| RetrieverError::LlmError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            provider: LlmProvider::for_model(&model),
            model,
            client,
        })
    }

    /// Create from environment variables.
    ///
    /// Reads the key from `ANTHROPIC_API_KEY`, `CEREBRAS_API_KEY` or
    /// `OPENAI_API_KEY` depending on the model.
    ///
    /// # Errors
    ///
    /// Returns `RetrieverError::ConfigError` if the key is not set
    pub fn from_env(model: &str) -> Result<Self> {
        let var = LlmProvider::for_model(model).api_key_var();
        let api_key = std::env::var(var).map_err(|_| {
            RetrieverError::ConfigError(format!("{} environment variable not set", var))
        })?;
        Self::new(api_key, model.to_string())
    }

    fn openai_messages(request: &ChatRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({"role": m.role, "content": m.content})),
        );
        messages
    }

    /// Call an OpenAI-compatible chat completions endpoint.
    async fn call_openai_compatible(&self, url: &str, model: &str, request: &ChatRequest) -> Result<String> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "model": model,
                "messages": Self::openai_messages(request),
                "max_tokens": request.max_tokens,
                "temperature": 0.0
            }))
            .send()
            .await
            .map_err(|e| RetrieverError::LlmError(format!("{} API error: {}", self.provider_name(), e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RetrieverError::LlmError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RetrieverError::LlmError(format!(
                "{} API error {}: {}",
                self.provider_name(),
                status,
                body
            )));
        }

        let parsed: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            RetrieverError::LlmError(format!("Failed to parse {} response: {}", self.provider_name(), e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| RetrieverError::LlmError(format!("No response from {}", self.provider_name())))
    }

    /// Call Anthropic API.
    async fn call_anthropic(&self, request: &ChatRequest) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": request.messages,
            "temperature": 0.0
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrieverError::LlmError(format!("Anthropic API error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RetrieverError::LlmError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(RetrieverError::LlmError(format!("Anthropic API error {}: {}", status, body)));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            RetrieverError::LlmError(format!("Failed to parse Anthropic response: {}\nBody: {}", e, body))
        })?;

        parsed
            .content
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| RetrieverError::LlmError("No response from Anthropic".to_string()))
    }

    fn provider_name(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAI => "OpenAI",
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::Cerebras => "Cerebras",
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let span = telemetry::llm_span(self.provider_name(), &self.model, request.max_tokens);

        async {
            let reply = match self.provider {
                LlmProvider::Anthropic => self.call_anthropic(request).await,
                LlmProvider::OpenAI => {
                    self.call_openai_compatible(
                        "https://api.openai.com/v1/chat/completions",
                        &self.model,
                        request,
                    )
                    .await
                }
                LlmProvider::Cerebras => {
                    let model = self.model.strip_prefix("cerebras:").unwrap_or(&self.model);
                    self.call_openai_compatible("https://api.cerebras.ai/v1/chat/completions", model, request)
                        .await
                }
            }?;

            tracing::debug!(chars = reply.len(), "LLM raw response:\n{}", reply);
            Ok::<_, RetrieverError>(reply)
        }
        .instrument(span)
        .await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_detection() {
        assert_eq!(LlmProvider::for_model("claude-3-5-sonnet-20240620"), LlmProvider::Anthropic);
        assert_eq!(LlmProvider::for_model("cerebras:llama3.1-70b"), LlmProvider::Cerebras);
        assert_eq!(LlmProvider::for_model("qwen-3-32b"), LlmProvider::Cerebras);
        assert_eq!(LlmProvider::for_model("gpt-4o"), LlmProvider::OpenAI);
        assert_eq!(LlmProvider::Anthropic.api_key_var(), "ANTHROPIC_API_KEY");
    }

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::with_system("pick tables", 1500).user("first").user("second");

        assert_eq!(request.system.as_deref(), Some("pick tables"));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.last_user(), Some("second"));
    }

    #[test]
    fn test_openai_messages_put_system_first() {
        let request = ChatRequest::with_system("sys", 10).user("hi");
        let messages = LlmClient::openai_messages(&request);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "hi");
    }
}
