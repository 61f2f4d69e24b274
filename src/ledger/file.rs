use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use tokio::fs;
use tokio::sync::RwLock;

use super::{check_key, state_root, StateError, StateKey, StateStore};

/// World state persisted as a JSON object of `key -> base64(value)`.
///
/// Reads are served from memory. A mutation holds the write lock while it
/// builds the next map, rewrites the file through a sibling temp file and a
/// rename, and only then swaps the map in. The file on disk is always either
/// the previous or the new state, and a failed write leaves memory untouched.
#[derive(Clone, Debug)]
pub struct FileState {
    path: PathBuf,
    entries: Arc<RwLock<BTreeMap<StateKey, Vec<u8>>>>,
}

impl FileState {
    /// Loads the state at `path`. A missing file is an empty state; it is
    /// created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let path = path.into();
        let entries = match fs::read(&path).await {
            Ok(bytes) => decode_entries(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened file state");
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn snapshot(&self) -> BTreeMap<StateKey, Vec<u8>> {
        self.entries.read().await.clone()
    }

    pub async fn state_root(&self) -> [u8; 32] {
        state_root(&*self.entries.read().await)
    }

    async fn mutate(
        &self,
        apply: impl FnOnce(&mut BTreeMap<StateKey, Vec<u8>>),
    ) -> Result<(), StateError> {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        apply(&mut next);
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }

    async fn persist(&self, entries: &BTreeMap<StateKey, Vec<u8>>) -> Result<(), StateError> {
        let encoded = encode_entries(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, encoded).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileState {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StateError> {
        check_key(key)?;
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        check_key(key)?;
        self.mutate(|entries| {
            entries.remove(key);
        })
        .await
    }
}

fn encode_entries(entries: &BTreeMap<StateKey, Vec<u8>>) -> Result<Vec<u8>, StateError> {
    let encoded: BTreeMap<&str, String> = entries
        .iter()
        .map(|(key, value)| (key.as_str(), general_purpose::STANDARD.encode(value)))
        .collect();
    serde_json::to_vec_pretty(&encoded).map_err(|e| StateError::Malformed(e.to_string()))
}

fn decode_entries(bytes: &[u8]) -> Result<BTreeMap<StateKey, Vec<u8>>, StateError> {
    let encoded: BTreeMap<StateKey, String> =
        serde_json::from_slice(bytes).map_err(|e| StateError::Malformed(e.to_string()))?;
    encoded
        .into_iter()
        .map(|(key, value)| {
            general_purpose::STANDARD
                .decode(value.as_bytes())
                .map(|bytes| (key.clone(), bytes))
                .map_err(|e| StateError::Malformed(format!("key {key}: {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = FileState::open(dir.path().join("world.json")).await.unwrap();
        assert!(state.snapshot().await.is_empty());
        assert!(!state.path().exists());
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("world.json");

        let state = FileState::open(&path).await.unwrap();
        state.put("1001", b"{\"value\":\"a\"}".to_vec()).await.unwrap();
        state.put("1002", vec![0, 159, 146, 150]).await.unwrap();
        state.delete("1001").await.unwrap();
        let root = state.state_root().await;

        let reopened = FileState::open(&path).await.unwrap();
        assert_eq!(reopened.get("1001").await.unwrap(), None);
        assert_eq!(
            reopened.get("1002").await.unwrap(),
            Some(vec![0, 159, 146, 150])
        );
        assert_eq!(reopened.state_root().await, root);
    }

    #[tokio::test]
    async fn file_maps_keys_to_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let state = FileState::open(&path).await.unwrap();
        state.put("k", b"hello".to_vec()).await.unwrap();

        let raw: BTreeMap<String, String> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["k"], "aGVsbG8=");
    }

    #[tokio::test]
    async fn garbage_file_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            FileState::open(&path).await,
            Err(StateError::Malformed(_))
        ));

        std::fs::write(&path, br#"{"k":"***"}"#).unwrap();
        assert!(matches!(
            FileState::open(&path).await,
            Err(StateError::Malformed(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_puts_all_reach_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let state = FileState::open(&path).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                state.put(&format!("k{i}"), vec![i as u8]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(state.snapshot().await.len(), 32);
        let reopened = FileState::open(&path).await.unwrap();
        assert_eq!(reopened.snapshot().await, state.snapshot().await);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocker").join("world.json");
        let state = FileState::open(&path).await.unwrap();
        // a regular file where the parent directory should be
        std::fs::write(dir.path().join("blocker"), b"").unwrap();

        assert!(matches!(
            state.put("1001", b"{\"value\":\"A\"}".to_vec()).await,
            Err(StateError::Io(_))
        ));
        assert_eq!(state.get("1001").await.unwrap(), None);
        assert!(state.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let state = FileState::open(&path).await.unwrap();
        state.put("1001", b"v".to_vec()).await.unwrap();

        // the rename onto a directory fails
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(state.delete("1001").await.is_err());
        assert_eq!(state.get("1001").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn rejected_key_does_not_touch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let state = FileState::open(&path).await.unwrap();
        assert!(matches!(
            state.put("", b"v".to_vec()).await,
            Err(StateError::EmptyKey)
        ));
        assert!(!path.exists());
    }
}
