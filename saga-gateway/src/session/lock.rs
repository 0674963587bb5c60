//! Per-session mutual exclusion for turns.
//!
//! Without it, two concurrent turns on one session both read the same record
//! and the later save drops the earlier turn. Holding the lock from session
//! load to save serializes them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type SessionMutex = Arc<tokio::sync::Mutex<()>>;

/// Lazily created async mutexes keyed by session id.
#[derive(Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<String, SessionMutex>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `session_id`.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}
