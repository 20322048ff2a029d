//! LLM Client: the single point of entry for every chat-completions call.
//!
//! ARCHITECTURAL RULE: No other module may call a provider API directly.
//! The generation chain talks to providers only through `CompletionProvider`.
//!
//! Both providers speak the OpenAI-compatible chat-completions dialect, so one
//! client type covers them; each instance is bound to a single credential.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl LlmError {
    /// 429 (rate limit) and 413 (request too large for the key's tier) are
    /// worth retrying with another credential.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::Api { status: 429 | 413, .. })
    }
}

/// A text-completion backend. The generation chain depends on this trait
/// only, so tests substitute fakes.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short label used in logs (never the credential itself).
    fn label(&self) -> &str;

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Connection settings for one provider endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub label: String,
    pub url: String,
    pub model: String,
    pub timeout: Duration,
}

/// Chat-completions client bound to one endpoint and one API key.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: EndpointConfig,
    api_key: String,
}

impl std::fmt::Debug for ChatCompletionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsClient {
    pub fn new(endpoint: EndpointConfig, api_key: String) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(endpoint.timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// Makes one call to the endpoint. No retries here: credential rotation
    /// and provider fallback belong to the generation chain.
    pub async fn call(&self, system: &str, prompt: &str) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&self.endpoint.url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(body),
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        if let Some(usage) = &chat_response.usage {
            debug!(
                "{} call succeeded: prompt_tokens={}, completion_tokens={}",
                self.endpoint.label, usage.prompt_tokens, usage.completion_tokens
            );
        }
        Ok(chat_response)
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionsClient {
    fn label(&self) -> &str {
        &self.endpoint.label
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let response = self.call(system, prompt).await?;
        response
            .text()
            .map(str::to_string)
            .ok_or(LlmError::EmptyContent)
    }
}

/// Pulls `error.message` out of an error body, falling back to the raw body.
fn api_error_message(body: String) -> String {
    serde_json::from_str::<ApiError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_class() {
        let api = |status| LlmError::Api {
            status,
            message: String::new(),
        };
        assert!(api(429).is_rate_limited());
        assert!(api(413).is_rate_limited());
        assert!(!api(401).is_rate_limited());
        assert!(!api(500).is_rate_limited());
        assert!(!LlmError::EmptyContent.is_rate_limited());
    }

    #[test]
    fn test_api_error_message_prefers_provider_message() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "tokens"}}"#;
        assert_eq!(api_error_message(body.to_string()), "Rate limit reached");
        assert_eq!(api_error_message("gateway timeout".to_string()), "gateway timeout");
    }

    #[test]
    fn test_response_text_skips_blank_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  "}}]}"#,
        )
        .unwrap();
        assert!(response.text().is_none());

        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"content": "\\documentclass{article}"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5}}"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some(r"\documentclass{article}"));
    }

    #[test]
    fn test_request_serialization_shape() {
        let request = ChatRequest {
            model: "m",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "m");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["max_tokens"], 4096);
    }
}
