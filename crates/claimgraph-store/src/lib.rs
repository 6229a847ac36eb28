//! Content store adapter and collaborator stores.
//!
//! The engines treat block storage as an external, content-addressed service:
//! `put` is idempotent (same bytes, same identifier), `put_many` persists a
//! publish batch together, and `ensure_available` must make a remote block
//! locally readable or fail. [`MemoryStore`] is the reference implementation;
//! [`gateway::GatewayStore`] layers remote fetching on top of any local
//! store. Profile lookups (language/tool/agent names) live in [`profiles`].

pub mod gateway;
pub mod profiles;

use std::collections::HashMap;

use async_trait::async_trait;
use claimgraph_model::{identify_bytes, Identifier};
use parking_lot::RwLock;

pub use gateway::{GatewayClient, GatewayConfig, GatewayStore};
pub use profiles::{JsonProfiles, MemoryProfiles, ProfileKind, ProfileStore, ResolutionError};

/// A block ready for persistence: identifier plus canonical bytes.
pub type Block = (Identifier, Vec<u8>);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("block {0} not found")]
    NotFound(Identifier),
    #[error("block {id} does not hash to its identifier")]
    DigestMismatch { id: Identifier },
    #[error("gateway request failed: {0}")]
    Gateway(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Content store adapter
// ============================================================================

/// External content-addressed block store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist one block; returns its content identifier.
    async fn put(&self, bytes: Vec<u8>) -> Result<Identifier, StoreError>;

    /// Persist a batch as a unit. Children must precede their parents so a
    /// partial failure never leaves a persisted object with a dangling link.
    async fn put_many(&self, blocks: Vec<Block>) -> Result<(), StoreError>;

    /// Read a locally available block.
    async fn get(&self, id: &Identifier) -> Result<Vec<u8>, StoreError>;

    async fn has(&self, id: &Identifier) -> bool;

    /// Make `id` locally readable, fetching from a remote source if the
    /// implementation has one.
    async fn ensure_available(&self, id: &Identifier) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory reference store
// ============================================================================

/// In-process block store. Safe under concurrent writers: equal bytes map to
/// the same identifier, so duplicate puts are no-ops.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<Identifier, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct blocks held.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<Identifier, StoreError> {
        let id = identify_bytes(&bytes);
        self.blocks.write().entry(id.clone()).or_insert(bytes);
        Ok(id)
    }

    async fn put_many(&self, blocks: Vec<Block>) -> Result<(), StoreError> {
        for (id, bytes) in &blocks {
            if identify_bytes(bytes) != *id {
                return Err(StoreError::DigestMismatch { id: id.clone() });
            }
        }
        let mut guard = self.blocks.write();
        for (id, bytes) in blocks {
            guard.entry(id).or_insert(bytes);
        }
        Ok(())
    }

    async fn get(&self, id: &Identifier) -> Result<Vec<u8>, StoreError> {
        self.blocks
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn has(&self, id: &Identifier) -> bool {
        self.blocks.read().contains_key(id)
    }

    async fn ensure_available(&self, id: &Identifier) -> Result<(), StoreError> {
        if self.has(id).await {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.put(b"same bytes".to_vec()).await.unwrap();
        let b = store.put(b"same bytes".to_vec()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn get_returns_what_was_put() {
        let store = MemoryStore::new();
        let id = store.put(b"payload".to_vec()).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let store = MemoryStore::new();
        let id = identify_bytes(b"never stored");
        assert!(matches!(
            store.get(&id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.ensure_available(&id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn put_many_rejects_mislabeled_blocks() {
        let store = MemoryStore::new();
        let id = identify_bytes(b"right");
        let err = store
            .put_many(vec![(id, b"wrong".to_vec())])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DigestMismatch { .. }));
        assert!(store.is_empty());
    }
}
