//! Key-value persistence contract.
//!
//! The engine persists three independent collections (`models`, `rules`,
//! `metrics`) as opaque bytes. Backends only need to implement `load` and
//! `save`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};

/// Byte-oriented key-value store
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Read the value stored under `key`, `None` if absent
    fn load(&self, key: &str) -> DispatchResult<Option<Vec<u8>>>;

    /// Replace the value stored under `key`
    fn save(&self, key: &str, value: &[u8]) -> DispatchResult<()>;
}

/// In-process store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Storage for MemoryStore {
    fn load(&self, key: &str) -> DispatchResult<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &[u8]) -> DispatchResult<()> {
        self.entries.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// One JSON file per key inside a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a data directory
    pub fn open(root: impl Into<PathBuf>) -> DispatchResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| DispatchError::storage(root.display().to_string(), e.to_string()))?;
        Ok(Self { root })
    }

    /// Data directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl Storage for FileStore {
    fn load(&self, key: &str) -> DispatchResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DispatchError::storage(key, e.to_string())),
        }
    }

    fn save(&self, key: &str, value: &[u8]) -> DispatchResult<()> {
        let target = self.path_for(key);
        let staging = self.root.join(format!(".{key}.json.tmp"));

        fs::write(&staging, value).map_err(|e| DispatchError::storage(key, e.to_string()))?;
        fs::rename(&staging, &target).map_err(|e| DispatchError::storage(key, e.to_string()))?;

        debug!(key = %key, bytes = value.len(), "Persisted collection");
        Ok(())
    }
}
