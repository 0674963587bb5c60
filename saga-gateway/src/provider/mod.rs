//! Completion provider abstraction.
//!
//! The chat pipeline only needs one capability from an LLM: take an ordered
//! list of role-tagged messages plus a sampling temperature and return a
//! single generated message. [`Provider`] is that seam; [`OpenAIProvider`]
//! talks to an OpenAI-compatible API and [`ResilientProvider`] adds retries.

mod openai;
mod resilient;

pub use openai::OpenAIProvider;
pub use resilient::{ResilienceConfig, ResilientProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Provider Trait
// ============================================================================

/// Unified interface for chat completion backends.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Send a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Transport failures, rate limits and server errors are worth retrying;
    /// other client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self.status_code {
            None => true,
            Some(429) => true,
            Some(code) => code >= 500,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation. Also the persisted form of session history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Unified chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Messages in the conversation, oldest first
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Unified chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Provider name
    pub provider: String,
    /// Model used
    pub model: String,
    /// Response content
    pub content: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Finish reason
    pub finish_reason: Option<String>,
    /// Response latency in milliseconds
    pub latency_ms: u64,
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization_shape() {
        let json = serde_json::to_string(&Message::assistant("Hi there")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"Hi there"}"#);

        let parsed: Message = serde_json::from_str(r#"{"role":"system","content":"x"}"#).unwrap();
        assert_eq!(parsed.role, Role::System);
    }

    #[test]
    fn test_chat_request_skips_unset_options() {
        let request = ChatRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("Hello")],
            max_tokens: None,
            temperature: Some(0.8),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["temperature"], 0.8);
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_provider_error_retryable() {
        let network = ProviderError::new("openai", "gpt-4o", "connection reset");
        assert!(network.is_retryable());
        assert!(network.clone().with_status(429).is_retryable());
        assert!(network.clone().with_status(503).is_retryable());
        assert!(!network.clone().with_status(400).is_retryable());
        assert!(!network.with_status(401).is_retryable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("openai", "gpt-4o", "API error: boom").with_status(500);
        assert_eq!(err.to_string(), "[openai:gpt-4o] API error: boom");
    }
}
