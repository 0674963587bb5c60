//! Fact extraction.
//!
//! After each reply the conversation is sent back to the model with one extra
//! instruction asking for durable facts about the user as a JSON object. The
//! outcome is a typed result so callers can tell a provider failure from a
//! model that answered with something other than a JSON object; the turn
//! orchestrator ignores every failure.

use crate::provider::{ChatRequest, Message, Provider, ProviderError};
use crate::session::FactMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Instruction appended (for this request only) to the conversation.
pub const FACT_REQUEST_PROMPT: &str = "Analyze the conversation. If there are new facts about the user \
(name, preferences, interests) that should be remembered for future chats, output them as JSON. \
Otherwise, output {}.";

/// Why a fact extraction produced nothing.
#[derive(Error, Debug)]
pub enum FactError {
    #[error("fact extraction request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("fact extraction returned malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("fact extraction returned {0} instead of an object")]
    NotAnObject(&'static str),

    #[error("fact extraction did not finish within {0:?}")]
    Timeout(Duration),
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse model output strictly as a JSON object.
pub fn parse_facts(text: &str) -> Result<FactMap, FactError> {
    match serde_json::from_str::<Value>(text).map_err(FactError::Malformed)? {
        Value::Object(map) => Ok(map),
        other => Err(FactError::NotAnObject(json_kind(&other))),
    }
}

/// Asks the model for user facts at a deterministic temperature.
pub struct FactExtractor {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    max_tokens: Option<i64>,
    deadline: Option<Duration>,
}

impl FactExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            deadline: None,
        }
    }

    /// Give up on extraction (retries included) after `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<i64>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Extract facts from `conversation`, which should already end with the
    /// assistant's reply. The conversation itself is not modified.
    pub async fn extract(&self, conversation: &[Message]) -> Result<FactMap, FactError> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        messages.extend_from_slice(conversation);
        messages.push(Message::user(FACT_REQUEST_PROMPT));

        let request = self.provider.chat(ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: Some(self.temperature),
        });

        let response = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, request)
                .await
                .map_err(|_| FactError::Timeout(deadline))??,
            None => request.await?,
        };

        parse_facts(&response.content)
    }
}
