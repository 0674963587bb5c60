//! Saga Gateway - Moderated, session-aware chat over HTTP.
//!
//! This crate provides the chat service behind SagaCrush:
//! - Content moderation with hard blocks and soft warnings
//! - Sessions with a sliding expiry in Redis (or in memory)
//! - Persona modes and remembered user facts
//! - OpenAI-compatible completions with retries
//!
//! ## Architecture
//!
//! ```text
//! Client → Gateway (moderate → session → assemble → complete) → OpenAI
//!                                   ↓
//!                      Extract facts → Persist session
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod assembler;
pub mod error;
pub mod facts;
pub mod moderation;
pub mod orchestrator;
pub mod persona;
pub mod provider;
pub mod routes;
pub mod session;

pub use error::ChatError;
pub use facts::{FactError, FactExtractor};
pub use moderation::{ModerationGate, ModerationProvider, ModerationResult, Verdict};
pub use orchestrator::{ChatService, TurnReply, TurnRequest, TurnSettings};
pub use provider::{
    ChatRequest, ChatResponse, Message, OpenAIProvider, Provider, ProviderError, ResilienceConfig,
    ResilientProvider, Role,
};
pub use session::{InMemoryBackend, Session, SessionBackend, SessionStore};

use anyhow::Context;
use axum::Router;
use saga_common::config::{Config, SessionConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Open the configured session backend.
pub async fn build_backend(config: &SessionConfig) -> anyhow::Result<Arc<dyn SessionBackend>> {
    match config.backend.as_str() {
        #[cfg(feature = "redis-backend")]
        "redis" => {
            let url = config.redis.connection_url();
            let backend = session::RedisBackend::connect(&url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}:{}", config.redis.host, config.redis.port))?;
            tracing::info!(db = config.redis.db, "Using Redis session store");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "redis-backend"))]
        "redis" => {
            tracing::warn!("Built without redis-backend, falling back to in-memory sessions");
            Ok(Arc::new(InMemoryBackend::new()))
        }
        _ => {
            tracing::info!("Using in-memory session store");
            Ok(Arc::new(InMemoryBackend::new()))
        }
    }
}

/// Wire the chat service from configuration.
pub async fn build_service(config: &Config) -> anyhow::Result<ChatService> {
    let api_key = config
        .openai_api_key()
        .context("OPENAI_API_KEY is not set")?;

    let openai = Arc::new(OpenAIProvider::with_base_url(
        api_key,
        config.llm.base_url.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    ));

    let gate = if config.moderation.enabled {
        ModerationGate::new(openai.clone(), config.moderation.model.clone())
    } else {
        tracing::warn!("Moderation is disabled");
        ModerationGate::disabled()
    };

    let provider: Arc<dyn Provider> = Arc::new(ResilientProvider::new(
        openai,
        ResilienceConfig::from(&config.llm),
    ));

    let backend = build_backend(&config.session).await?;
    let store = SessionStore::from_config(backend, &config.session);

    Ok(ChatService::new(
        store,
        gate,
        provider,
        TurnSettings::from_config(config),
    ))
}

/// Build the gateway router around an existing service.
pub fn build_router(service: Arc<ChatService>, config: &Config) -> Router {
    routes::build_routes(service, &config.gateway)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.network.bind.parse::<std::net::IpAddr>()?,
        config.network.port,
    ));

    let service = Arc::new(build_service(config).await?);
    let router = build_router(service, config);

    tracing::info!("Starting Saga Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
