//! Turn orchestration.
//!
//! One user turn runs as a linear pipeline:
//!
//! ```text
//! moderate ──blocked──▶ rejection reply (no session touched)
//!    │
//!    ▼
//! resolve session → assemble → complete → warn prefix → extract facts → persist
//! ```
//!
//! Only a failure of the primary completion (or of the store) fails the turn.
//! Moderation fails open and fact extraction failures are ignored.

use crate::assembler::assemble;
use crate::error::{ChatError, SESSION_ID_REQUIRED};
use crate::facts::FactExtractor;
use crate::moderation::ModerationGate;
use crate::persona::BotIdentity;
use crate::provider::{ChatRequest, Message, Provider};
use crate::session::{SessionLocks, SessionStore};
use saga_common::logging::generate_trace_id;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Reply sent when moderation rejects a message.
pub const BLOCKED_REPLY: &str = "🚫 Your message violates content guidelines and cannot be processed.";

/// Session id echoed for blocked messages that arrived without one.
pub const UNKNOWN_SESSION: &str = "unknown";

/// One incoming user message.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub mode: String,
    pub session_id: Option<String>,
}

/// Result of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub reply: String,
    pub session_id: String,
}

/// Backend state as reported by the health endpoint.
#[derive(Debug, Clone)]
pub struct StoreHealth {
    pub backend: String,
    pub healthy: bool,
}

/// Tunables for a turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub identity: BotIdentity,
    pub model: String,
    pub reply_temperature: f64,
    pub fact_temperature: f64,
    pub fact_timeout: Duration,
    pub max_tokens: Option<i64>,
    pub serialize_turns: bool,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self::from_config(&saga_common::Config::default())
    }
}

impl TurnSettings {
    pub fn from_config(config: &saga_common::Config) -> Self {
        Self {
            identity: BotIdentity::from(&config.bot),
            model: config.llm.chat_model.clone(),
            reply_temperature: config.llm.reply_temperature,
            fact_temperature: config.llm.fact_temperature,
            fact_timeout: Duration::from_secs(config.llm.fact_timeout_secs),
            max_tokens: config.llm.max_tokens,
            serialize_turns: config.session.serialize_turns,
        }
    }
}

/// Runs chat turns and session commands.
pub struct ChatService {
    store: SessionStore,
    gate: ModerationGate,
    provider: Arc<dyn Provider>,
    extractor: FactExtractor,
    identity: BotIdentity,
    model: String,
    reply_temperature: f64,
    max_tokens: Option<i64>,
    locks: Option<SessionLocks>,
}

impl ChatService {
    pub fn new(
        store: SessionStore,
        gate: ModerationGate,
        provider: Arc<dyn Provider>,
        settings: TurnSettings,
    ) -> Self {
        let extractor =
            FactExtractor::new(provider.clone(), settings.model.clone(), settings.fact_temperature)
                .with_max_tokens(settings.max_tokens)
                .with_deadline(settings.fact_timeout);

        Self {
            store,
            gate,
            provider,
            extractor,
            identity: settings.identity,
            model: settings.model,
            reply_temperature: settings.reply_temperature,
            max_tokens: settings.max_tokens,
            locks: settings.serialize_turns.then(SessionLocks::new),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Process one user message.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnReply, ChatError> {
        let span = tracing::info_span!(
            "turn",
            trace_id = %generate_trace_id(),
            mode = %request.mode,
        );
        self.run_turn(request).instrument(span).await
    }

    async fn run_turn(&self, request: TurnRequest) -> Result<TurnReply, ChatError> {
        let verdict = self.gate.check(&request.message).await;
        if !verdict.safe {
            let session_id = request
                .session_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| UNKNOWN_SESSION.to_string());
            return Ok(TurnReply {
                reply: BLOCKED_REPLY.to_string(),
                session_id,
            });
        }

        let session_id = self.resolve_session(request.session_id.as_deref()).await?;

        let _guard = match &self.locks {
            Some(locks) => Some(locks.acquire(&session_id).await),
            None => None,
        };

        let mut session = self.store.get(&session_id).await?;
        let mut messages = assemble(&self.identity, &request.mode, &session, &request.message);

        let response = self
            .provider
            .chat(ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                max_tokens: self.max_tokens,
                temperature: Some(self.reply_temperature),
            })
            .await?;

        tracing::info!(
            session_id = %session_id,
            model = %response.model,
            latency_ms = response.latency_ms,
            total_tokens = response.usage.total_tokens,
            "Reply generated"
        );

        let reply = if verdict.has_warning() {
            format!("{}\n{}", verdict.warning, response.content)
        } else {
            response.content
        };
        messages.push(Message::assistant(reply.clone()));

        match self.extractor.extract(&messages).await {
            Ok(facts) => {
                if !facts.is_empty() {
                    tracing::debug!(session_id = %session_id, count = facts.len(), "Facts extracted");
                }
                session.merge_facts(facts);
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, reason = %e, "Fact extraction skipped");
            }
        }

        session.messages = messages;
        self.store.save(&session_id, &session).await?;

        Ok(TurnReply { reply, session_id })
    }

    /// Use the caller's session if it is still live, otherwise mint a new one.
    async fn resolve_session(&self, requested: Option<&str>) -> Result<String, ChatError> {
        if let Some(id) = requested.filter(|id| !id.is_empty()) {
            if self.store.exists(id).await? {
                return Ok(id.to_string());
            }
            tracing::info!(requested = %id, "Requested session not found, starting a new one");
        }
        Ok(self.store.create().await?)
    }

    /// Start an empty session.
    pub async fn new_session(&self) -> Result<String, ChatError> {
        Ok(self.store.create().await?)
    }

    /// Drop the history of a session, keeping its facts.
    pub async fn clear_session(&self, session_id: Option<String>) -> Result<String, ChatError> {
        let id = require_session_id(session_id)?;
        self.store.clear_messages(&id).await?;
        Ok(id)
    }

    /// Delete a session entirely.
    pub async fn delete_session(&self, session_id: Option<String>) -> Result<String, ChatError> {
        let id = require_session_id(session_id)?;
        self.store.delete(&id).await?;
        Ok(id)
    }

    pub async fn health(&self) -> StoreHealth {
        StoreHealth {
            backend: self.store.backend_name().to_string(),
            healthy: self.store.is_healthy().await,
        }
    }
}

fn require_session_id(session_id: Option<String>) -> Result<String, ChatError> {
    session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ChatError::Validation(SESSION_ID_REQUIRED.to_string()))
}
