//! World state: the key-value collaborator every contract call goes through.
//!
//! [`StateStore`] is the only seam between contract logic and persistence.
//! Two backends ship with the crate:
//!
//! * [`MemoryState`] — a shared in-process map, used by tests and embedders.
//! * [`FileState`] — a JSON file rewritten on every mutation.
//!
//! [`state_root`] condenses a snapshot into a single SHA-256 Merkle root so
//! two states can be compared without shipping their contents.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

mod file;

pub use file::FileState;

pub type StateKey = String;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed state file: {0}")]
    Malformed(String),
    #[error("state key must not be empty")]
    EmptyKey,
}

/// Async key-value access to the world state.
///
/// `get` returns `None` for unset keys. Implementations use interior
/// mutability so a single handle can be shared by concurrent callers.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StateError>;

    async fn delete(&self, key: &str) -> Result<(), StateError>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for &T {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        (**self).delete(key).await
    }
}

pub(crate) fn check_key(key: &str) -> Result<(), StateError> {
    if key.is_empty() {
        return Err(StateError::EmptyKey);
    }
    Ok(())
}

/// In-memory world state. Clones share the same underlying map.
#[derive(Clone, Debug, Default)]
pub struct MemoryState {
    entries: Arc<RwLock<BTreeMap<StateKey, Vec<u8>>>>,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> BTreeMap<StateKey, Vec<u8>> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn state_root(&self) -> [u8; 32] {
        state_root(&*self.entries.read().await)
    }
}

#[async_trait]
impl StateStore for MemoryState {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        check_key(key)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        check_key(key)?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Merkle root over every key/value pair, in key order.
pub fn state_root(entries: &BTreeMap<StateKey, Vec<u8>>) -> [u8; 32] {
    let leaves = entries
        .iter()
        .map(|(key, value)| {
            let mut hasher = Sha256::new();
            hasher.update(b"state");
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(value);
            hasher.finalize().into()
        })
        .collect();
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"share-asset-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            if chunk.len() == 2 {
                hasher.update(chunk[1]);
            } else {
                hasher.update(chunk[0]);
            }
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
