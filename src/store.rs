//! Trigger persistence seam.
//!
//! The engine never talks to a database directly; it goes through
//! [`TriggerStore`]. Hosts back it with whatever keyed store they run.
//! [`MemoryTriggerStore`] ships as a reference implementation for
//! hosts without persistence and for tests.
//!
//! Add/remove operations persist *before* mutating the in-memory
//! index, so a store failure leaves the engine's state untouched.

use crate::message::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached
    #[error("trigger store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data the engine cannot use
    #[error("trigger store returned corrupt data: {0}")]
    Corrupt(String),
}

/// One persisted trigger row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TriggerRecord {
    /// The subscribing user
    #[serde(rename = "ownerId")]
    pub owner_id: UserId,
    /// The raw phrase
    pub phrase: String,
}

/// Persistent storage for trigger definitions.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Persist a new trigger, returning the stored record.
    async fn insert(&self, owner_id: UserId, phrase: &str) -> Result<TriggerRecord, StoreError>;

    /// Delete the given phrases for one owner. Phrases not present are
    /// ignored.
    async fn delete(&self, owner_id: UserId, phrases: &[String]) -> Result<(), StoreError>;

    /// Every persisted trigger, for engine startup.
    async fn load_all(&self) -> Result<Vec<TriggerRecord>, StoreError>;
}

/// In-memory [`TriggerStore`] with no durability.
#[derive(Debug, Default)]
pub struct MemoryTriggerStore {
    records: Mutex<Vec<TriggerRecord>>,
}

impl MemoryTriggerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with records (startup-load tests).
    pub fn with_records(records: Vec<TriggerRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl TriggerStore for MemoryTriggerStore {
    async fn insert(&self, owner_id: UserId, phrase: &str) -> Result<TriggerRecord, StoreError> {
        let record = TriggerRecord {
            owner_id,
            phrase: phrase.to_string(),
        };
        self.records.lock().await.push(record.clone());
        debug!(owner = %owner_id, "Trigger persisted");
        Ok(record)
    }

    async fn delete(&self, owner_id: UserId, phrases: &[String]) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .retain(|r| r.owner_id != owner_id || !phrases.contains(&r.phrase));
        debug!(owner = %owner_id, count = phrases.len(), "Triggers deleted from store");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TriggerRecord>, StoreError> {
        Ok(self.records.lock().await.clone())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! A store that fails on demand, for persistence-failure tests.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    pub struct FlakyTriggerStore {
        inner: MemoryTriggerStore,
        pub fail: AtomicBool,
    }

    impl FlakyTriggerStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.fail.load(Ordering::Relaxed) {
                Err(StoreError::Unavailable("mock store offline".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TriggerStore for FlakyTriggerStore {
        async fn insert(
            &self,
            owner_id: UserId,
            phrase: &str,
        ) -> Result<TriggerRecord, StoreError> {
            self.check()?;
            self.inner.insert(owner_id, phrase).await
        }

        async fn delete(&self, owner_id: UserId, phrases: &[String]) -> Result<(), StoreError> {
            self.check()?;
            self.inner.delete(owner_id, phrases).await
        }

        async fn load_all(&self) -> Result<Vec<TriggerRecord>, StoreError> {
            self.check()?;
            self.inner.load_all().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_load_roundtrip() {
        let store = MemoryTriggerStore::new();
        store.insert(1, "rust").await.unwrap();
        store.insert(2, "tokio").await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].owner_id, 1);
        assert_eq!(all[0].phrase, "rust");
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_owner() {
        let store = MemoryTriggerStore::new();
        store.insert(1, "rust").await.unwrap();
        store.insert(2, "rust").await.unwrap();

        store.delete(1, &["rust".to_string()]).await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].owner_id, 2);
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_phrases() {
        let store = MemoryTriggerStore::new();
        store.insert(1, "rust").await.unwrap();
        store
            .delete(1, &["never stored".to_string()])
            .await
            .unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }
}
