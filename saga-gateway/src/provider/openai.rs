//! OpenAI provider implementation (chat completions and moderation).

use super::{ChatRequest, ChatResponse, Message, Provider, ProviderError, TokenUsage};
use crate::moderation::{ModerationProvider, ModerationResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const PROVIDER_NAME: &str = "openai";

/// OpenAI API provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a provider against `base_url` (the public API or a compatible one).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let api_key = api_key.into();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// POST a JSON body and decode the JSON reply, mapping every failure to a
    /// [`ProviderError`] tagged with `model`.
    async fn post_json<B, R>(&self, path: &str, model: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::new(PROVIDER_NAME, model, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                ProviderError::new(PROVIDER_NAME, model, format!("API error: {}", body))
                    .with_status(status.as_u16()),
            );
        }

        response.json().await.map_err(|e| {
            ProviderError::new(
                PROVIDER_NAME,
                model,
                format!("Failed to parse response: {}", e),
            )
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();

        let openai_request = OpenAIRequest {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let openai_response: OpenAIResponse = self
            .post_json("chat/completions", &request.model, &openai_request)
            .await?;
        let latency_ms = start.elapsed().as_millis() as u64;

        into_chat_response(openai_response, &request.model, latency_ms)
    }
}

/// Convert the first choice of a completion. A choice without content (a
/// refusal or a filtered reply) is an error, never an empty reply.
fn into_chat_response(
    response: OpenAIResponse,
    requested_model: &str,
    latency_ms: u64,
) -> Result<ChatResponse, ProviderError> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        ProviderError::new(PROVIDER_NAME, requested_model, "Response contained no choices")
    })?;

    let content = choice.message.content.ok_or_else(|| {
        let reason = choice.finish_reason.as_deref().unwrap_or("unknown");
        // The HTTP call succeeded; a 200 status keeps this out of the retry loop
        ProviderError::new(
            PROVIDER_NAME,
            requested_model,
            format!("Response contained no content (finish_reason: {})", reason),
        )
        .with_status(200)
    })?;

    let usage = response.usage.unwrap_or_default();

    Ok(ChatResponse {
        provider: PROVIDER_NAME.into(),
        model: response.model,
        content,
        usage: TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
        finish_reason: choice.finish_reason,
        latency_ms,
    })
}

#[async_trait]
impl ModerationProvider for OpenAIProvider {
    async fn moderate(&self, model: &str, input: &str) -> Result<ModerationResult, ProviderError> {
        let request = ModerationRequest { model, input };

        let response: ModerationResponse = self.post_json("moderations", model, &request).await?;

        let result = response.results.into_iter().next().ok_or_else(|| {
            ProviderError::new(PROVIDER_NAME, model, "Moderation response contained no results")
        })?;

        Ok(ModerationResult {
            flagged: result.flagged,
            categories: result.categories,
        })
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    // null when the model refuses
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationEntry>,
}

#[derive(Debug, Deserialize)]
struct ModerationEntry {
    flagged: bool,
    #[serde(default)]
    categories: HashMap<String, bool>,
}
