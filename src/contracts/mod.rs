use serde::{Deserialize, Serialize};

use crate::ledger::{StateError, StateStore};

pub mod registry;

pub type ShareAssetId = String;

/// The single record shape kept in world state.
///
/// Stored as UTF-8 JSON `{"value":"..."}`; unknown fields are rejected so a
/// record written by something else is reported as corrupt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ShareAsset {
    pub value: String,
}

impl ShareAsset {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ContractError> {
        serde_json::to_vec(self).map_err(ContractError::Encoding)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("The share asset {id} already exists")]
    AlreadyExists { id: ShareAssetId },
    #[error("The share asset {id} does not exist")]
    NotFound { id: ShareAssetId },
    #[error("The share asset {id} is corrupt: {source}")]
    Corrupt {
        id: ShareAssetId,
        source: serde_json::Error,
    },
    #[error("failed to encode share asset: {0}")]
    Encoding(#[source] serde_json::Error),
    #[error("You've asked to invoke a function that does not exist: {name}")]
    UnknownTransaction { name: String },
    #[error("Expected {expected} parameters, but {actual} have been supplied to {name}")]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    State(#[from] StateError),
}

/// CRUD over [`ShareAsset`] records keyed by id.
///
/// Every operation is a check followed by at most one store call; there is
/// no locking around the pair, so conflicting writers are left to whatever
/// orders transactions above this layer.
pub struct ShareAssetStore<S> {
    state: S,
}

impl<S: StateStore> ShareAssetStore<S> {
    pub fn new(state: S) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub async fn exists(&self, id: &str) -> Result<bool, ContractError> {
        let buffer = self.state.get(id).await?;
        Ok(buffer.map_or(false, |bytes| !bytes.is_empty()))
    }

    pub async fn create(&self, id: &str, value: &str) -> Result<(), ContractError> {
        if self.exists(id).await? {
            return Err(ContractError::AlreadyExists { id: id.to_string() });
        }
        let bytes = ShareAsset::new(value).to_bytes()?;
        self.state.put(id, bytes).await?;
        tracing::debug!(id, "share asset created");
        Ok(())
    }

    pub async fn read(&self, id: &str) -> Result<ShareAsset, ContractError> {
        if !self.exists(id).await? {
            return Err(ContractError::NotFound { id: id.to_string() });
        }
        let buffer = match self.state.get(id).await? {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(ContractError::NotFound { id: id.to_string() }),
        };
        serde_json::from_slice(&buffer).map_err(|source| ContractError::Corrupt {
            id: id.to_string(),
            source,
        })
    }

    /// Replaces the whole record; nothing of the previous value is kept.
    pub async fn update(&self, id: &str, new_value: &str) -> Result<(), ContractError> {
        if !self.exists(id).await? {
            return Err(ContractError::NotFound { id: id.to_string() });
        }
        let bytes = ShareAsset::new(new_value).to_bytes()?;
        self.state.put(id, bytes).await?;
        tracing::debug!(id, "share asset updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), ContractError> {
        if !self.exists(id).await? {
            return Err(ContractError::NotFound { id: id.to_string() });
        }
        self.state.delete(id).await?;
        tracing::debug!(id, "share asset deleted");
        Ok(())
    }
}
