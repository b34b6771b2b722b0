//! Transient Key-Value Storage
//!
//! TTL-bounded storage for one-time codes and login challenges. Production
//! deployments back this with an external store; [`MemoryTtlStore`] is the
//! in-process fallback exposing identical get/set/delete-with-expiry
//! semantics. Callers never depend on process-lifetime globals.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// Key-value store errors
#[derive(Debug, Error)]
pub enum KvError {
    /// Backing store could not be reached
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Transient storage with expiry semantics
///
/// All implementations must expose the same contract: a key set with
/// `setex` is readable until its TTL elapses and invisible afterwards.
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Store `value` under `key` for `ttl_secs` seconds
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), KvError>;

    /// Read a key; expired keys read as absent
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Remove a key
    async fn del(&self, key: &str) -> Result<(), KvError>;

    /// Atomic read-then-delete
    ///
    /// Two concurrent calls for the same key must not both observe a value.
    async fn get_del(&self, key: &str) -> Result<Option<String>, KvError>;
}

/// In-process `TtlStore` fallback
///
/// A single mutex guards the map so `get_del` removes the entry in the same
/// critical section that reads it.
pub struct MemoryTtlStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop all expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, (_, deadline)| *deadline > now);
        before - entries.len()
    }
}

impl Default for MemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn setex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<(), KvError> {
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), deadline));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, deadline)) if *deadline <= now => {
                entries.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        // Remove under the lock; the read and the delete are one step.
        let removed = self.entries.lock().unwrap().remove(key);
        match removed {
            Some((_, deadline)) if deadline <= now => Ok(None),
            Some((value, _)) => Ok(Some(value)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setex_and_get() {
        let store = MemoryTtlStore::new();
        store.setex("k", 60, "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_absent() {
        let store = MemoryTtlStore::new();
        store.setex("k", 0, "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_del_removes_key() {
        let store = MemoryTtlStore::new();
        store.setex("k", 60, "v").await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_del_is_single_use() {
        let store = MemoryTtlStore::new();
        store.setex("k", 60, "v").await.unwrap();

        assert_eq!(store.get_del("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get_del("k").await.unwrap(), None);
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_del_expired_key() {
        let store = MemoryTtlStore::new();
        store.setex("k", 0, "v").await.unwrap();
        assert_eq!(store.get_del("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sweep_prunes_expired_entries() {
        let store = MemoryTtlStore::new();
        store.setex("dead", 0, "v").await.unwrap();
        store.setex("alive", 60, "v").await.unwrap();

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.get("alive").await.unwrap(), Some("v".to_string()));
    }
}
