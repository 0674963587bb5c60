//! Key-value backends with per-key expiry.
//!
//! - **Redis**: production backend, expiry enforced by Redis (`SET ... EX`)
//! - **In-Memory**: local development and tests, expiry checked lazily on access

use super::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Storage operations the session store needs.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Backend name for logs and health output.
    fn name(&self) -> &str;

    /// Fetch a live value. Missing and expired keys both yield `None`.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a value, replacing any previous one, expiring `ttl` from now.
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    /// Remove a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Whether a live value exists for `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Check backend health.
    async fn is_healthy(&self) -> bool;
}

// ============================================================================
// In-Memory Backend
// ============================================================================

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Expired entries are swept from the map once every this many writes.
const PRUNE_EVERY: u64 = 64;

/// Process-local backend. Sessions do not survive a restart.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicU64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Entries held in the map, expired ones included.
    #[cfg(test)]
    async fn raw_len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % PRUNE_EVERY == 0 {
            let before = entries.len();
            entries.retain(|_, e| e.is_live(now));
            let pruned = before - entries.len();
            if pruned > 0 {
                tracing::debug!(pruned, remaining = entries.len(), "Pruned expired sessions");
            }
        }

        entries.insert(key.to_string(), Entry { value, expires_at: now + ttl });
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).is_some_and(|e| e.is_live(now)))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================================================
// Redis Backend (Feature-gated)
// ============================================================================

/// Redis-backed session storage.
///
/// Each session is a plain string key holding the JSON record; the TTL is
/// reset with every `SET ... EX`.
#[cfg(feature = "redis-backend")]
pub struct RedisBackend {
    conn: redis::aio::ConnectionManager,
}

#[cfg(feature = "redis-backend")]
fn backend_error(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[cfg(feature = "redis-backend")]
impl RedisBackend {
    /// Connect to Redis. The connection manager reconnects on its own afterwards.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { conn })
    }
}

#[cfg(feature = "redis-backend")]
#[async_trait]
impl SessionBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(backend_error)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(backend_error)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map(|_| ())
            .map_err(backend_error)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map(|count| count > 0)
            .map_err(backend_error)
    }

    async fn is_healthy(&self) -> bool {
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }
}
