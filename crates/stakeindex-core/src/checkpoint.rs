//! Checkpoint manager: persists the indexer's position for crash recovery.
//!
//! A checkpoint stores the last fully finalized height and its block hash.
//! On restart the sync pipeline resumes after the checkpoint instead of
//! starting over from the first indexed height.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// A persisted checkpoint for an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Last finalized height.
    pub height: u64,
    /// Hash of the canonical block at `height`.
    pub block_hash: String,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the latest checkpoint for an indexer.
    async fn load_checkpoint(&self, indexer_id: &str) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete_checkpoint(&self, indexer_id: &str) -> Result<(), IndexerError>;
}

/// Manages checkpoint reads/writes for an indexer.
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    indexer_id: String,
    /// How often to save (every N heights).
    save_interval: u64,
    /// Heights finalized since last save.
    counter: u64,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            indexer_id: indexer_id.into(),
            save_interval: save_interval.max(1),
            counter: 0,
        }
    }

    pub fn indexer_id(&self) -> &str {
        &self.indexer_id
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load_checkpoint(&self.indexer_id).await
    }

    /// Height to resume from: the one after the checkpoint, else `first_height`.
    pub async fn resume_height(&self, first_height: u64) -> Result<u64, IndexerError> {
        Ok(match self.load().await? {
            Some(cp) => (cp.height + 1).max(first_height),
            None => first_height,
        })
    }

    /// Conditionally save a checkpoint every `save_interval` heights.
    pub async fn maybe_save(&mut self, height: u64, block_hash: &str) -> Result<(), IndexerError> {
        self.counter += 1;
        if self.counter >= self.save_interval {
            self.force_save(height, block_hash).await?;
            self.counter = 0;
        }
        Ok(())
    }

    /// Immediately save a checkpoint (used on shutdown and after reorgs).
    pub async fn force_save(&self, height: u64, block_hash: &str) -> Result<(), IndexerError> {
        let cp = Checkpoint {
            indexer_id: self.indexer_id.clone(),
            height,
            block_hash: block_hash.to_string(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        tracing::debug!(indexer = %self.indexer_id, height, "checkpoint saved");
        self.store.save_checkpoint(cp).await
    }

    /// Forget the saved position.
    pub async fn reset(&self) -> Result<(), IndexerError> {
        self.store.delete_checkpoint(&self.indexer_id).await
    }
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory checkpoint store for tests and ephemeral indexers.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    data: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Checkpoint>>, IndexerError> {
        self.data
            .lock()
            .map_err(|_| IndexerError::Storage("checkpoint store lock poisoned".into()))
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load_checkpoint(&self, indexer_id: &str) -> Result<Option<Checkpoint>, IndexerError> {
        Ok(self.lock()?.get(indexer_id).cloned())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        self.lock()?.insert(checkpoint.indexer_id.clone(), checkpoint);
        Ok(())
    }

    async fn delete_checkpoint(&self, indexer_id: &str) -> Result<(), IndexerError> {
        self.lock()?.remove(indexer_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mgr = CheckpointManager::new(store, "mina-mainnet", 10);

        // No checkpoint initially
        assert!(mgr.load().await.unwrap().is_none());

        mgr.force_save(1000, "3NKabc").await.unwrap();

        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.height, 1000);
        assert_eq!(cp.block_hash, "3NKabc");
        assert_eq!(cp.indexer_id, "mina-mainnet");
    }

    #[tokio::test]
    async fn checkpoint_save_interval() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut mgr = CheckpointManager::new(store, "idx", 5);

        // 4 heights, not saved yet
        for i in 1..=4 {
            mgr.maybe_save(i, "3NKhash").await.unwrap();
        }
        assert!(mgr.load().await.unwrap().is_none());

        mgr.maybe_save(5, "3NKhash5").await.unwrap();
        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.height, 5);
    }

    #[tokio::test]
    async fn resume_after_checkpoint() {
        let store = Arc::new(MemoryCheckpointStore::new());
        let mgr = CheckpointManager::new(store, "idx", 1);
        assert_eq!(mgr.resume_height(1).await.unwrap(), 1);

        mgr.force_save(41, "3NKa").await.unwrap();
        assert_eq!(mgr.resume_height(1).await.unwrap(), 42);
        // first height raised above the checkpoint wins
        assert_eq!(mgr.resume_height(100).await.unwrap(), 100);

        mgr.reset().await.unwrap();
        assert_eq!(mgr.resume_height(1).await.unwrap(), 1);
    }
}
