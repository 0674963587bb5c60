//! Session store: JSON records over a [`SessionBackend`] with a sliding TTL.

use super::{Session, SessionBackend, StoreResult};
use std::sync::Arc;
use std::time::Duration;

/// Typed access to session records.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    ttl: Duration,
    key_prefix: String,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn SessionBackend>, ttl: Duration, key_prefix: impl Into<String>) -> Self {
        Self {
            backend,
            ttl,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn from_config(backend: Arc<dyn SessionBackend>, config: &saga_common::SessionConfig) -> Self {
        Self::new(
            backend,
            Duration::from_secs(config.ttl_secs),
            config.key_prefix.clone(),
        )
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn is_healthy(&self) -> bool {
        self.backend.is_healthy().await
    }

    /// Load a session. Missing or expired ids yield an empty session.
    pub async fn get(&self, id: &str) -> StoreResult<Session> {
        match self.backend.get(&self.key(id)).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Session::default()),
        }
    }

    /// Persist a session and restart its expiry window.
    pub async fn save(&self, id: &str, session: &Session) -> StoreResult<()> {
        let raw = serde_json::to_string(session)?;
        self.backend.set_with_ttl(&self.key(id), raw, self.ttl).await?;
        tracing::debug!(
            session_id = %id,
            messages = session.messages.len(),
            facts = session.facts.len(),
            ttl_secs = self.ttl.as_secs(),
            "Session saved"
        );
        Ok(())
    }

    /// Whether a live session exists under `id`.
    pub async fn exists(&self, id: &str) -> StoreResult<bool> {
        self.backend.exists(&self.key(id)).await
    }

    /// Remove a session and everything in it.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        self.backend.delete(&self.key(id)).await?;
        tracing::debug!(session_id = %id, "Session deleted");
        Ok(())
    }

    /// Empty the message history, keeping facts. Refreshes the TTL.
    pub async fn clear_messages(&self, id: &str) -> StoreResult<()> {
        let mut session = self.get(id).await?;
        session.messages.clear();
        self.save(id, &session).await
    }

    /// Mint a new session id and persist an empty session under it.
    pub async fn create(&self) -> StoreResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.save(&id, &Session::default()).await?;
        tracing::info!(session_id = %id, "Session created");
        Ok(id)
    }
}
