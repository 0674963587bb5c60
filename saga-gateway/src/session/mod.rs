//! Server-side conversation sessions.
//!
//! A session is the message history plus the facts remembered about the
//! user, stored as one JSON record per session id with a sliding TTL.

mod backend;
mod lock;
mod store;

pub use backend::{InMemoryBackend, SessionBackend};
#[cfg(feature = "redis-backend")]
pub use backend::RedisBackend;
pub use lock::SessionLocks;
pub use store::SessionStore;

use crate::provider::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Facts remembered about the user, keyed by fact name.
pub type FactMap = serde_json::Map<String, serde_json::Value>;

/// Session store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the backend.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted session record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub facts: FactMap,
}

impl Session {
    /// Merge newly extracted facts. Existing keys are overwritten, nothing is removed.
    pub fn merge_facts(&mut self, new_facts: FactMap) {
        self.facts.extend(new_facts);
    }
}
