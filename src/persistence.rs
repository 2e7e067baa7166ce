//! Snapshot persistence over an opaque key-value store.

use crate::models::{BracketSlot, Participant};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// Key the tournament snapshot is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "chatmon";

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored snapshot could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Invalid storage key {0:?}")]
    InvalidKey(String),
    #[error("No saved tournament")]
    NotFound,
}

/// Roster + bracket, as persisted between visits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub monsters_data: Vec<Participant>,
    pub tournament_data: Vec<BracketSlot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(monsters_data: Vec<Participant>, tournament_data: Vec<BracketSlot>) -> Self {
        Self {
            monsters_data,
            tournament_data,
            saved_at: None,
        }
    }
}

/// Storage engine: put/get/delete/exists on byte blobs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
    async fn delete(&self, key: &str) -> Result<(), PersistenceError>;
    async fn exists(&self, key: &str) -> Result<bool, PersistenceError>;
}

/// Process-local store, used in tests and when no storage directory is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, PersistenceError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }
}

/// One JSON file per key inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // Readers only ever see a complete file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, PersistenceError> {
        Ok(tokio::fs::try_exists(self.path_for(key)?).await?)
    }
}

/// Save/load/exists/remove of the tournament snapshot under one key.
pub struct PersistenceGateway {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl PersistenceGateway {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        let mut stamped = snapshot.clone();
        stamped.saved_at = Some(Utc::now());
        let blob = serde_json::to_vec(&stamped)?;
        self.store.put(&self.key, blob).await?;
        log::debug!("Saved tournament snapshot under {:?}", self.key);
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        match self.store.get(&self.key).await? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    /// Load for "continue previous tournament", where a missing snapshot is an error.
    pub async fn load_required(&self) -> Result<Snapshot, PersistenceError> {
        self.load().await?.ok_or(PersistenceError::NotFound)
    }

    pub async fn exists(&self) -> Result<bool, PersistenceError> {
        self.store.exists(&self.key).await
    }

    pub async fn remove(&self) -> Result<(), PersistenceError> {
        self.store.delete(&self.key).await
    }

    /// Best-effort save: failures are logged and the game continues in memory.
    pub async fn save_or_warn(&self, snapshot: &Snapshot) -> bool {
        match self.save(snapshot).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Could not persist tournament, continuing in memory: {}", e);
                false
            }
        }
    }
}
