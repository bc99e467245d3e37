//! Local key-value persistence.
//!
//! Callers treat every failure as "value absent"; the store is never required
//! for in-memory state to be correct.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// Key holding the serialized history log.
pub const HISTORY_KEY: &str = "jagapadi-history";

/// Key holding the dark-mode flag.
pub const DARK_MODE_KEY: &str = "jagapadi-dark-mode";

/// String key-value storage capability.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::Store(format!("invalid key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(format!("failed to read {:?}: {}", path, e))),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Store(format!("failed to create {:?}: {}", self.dir, e)))?;

        // Uniquely named sibling, then renamed over the target.
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::Store(format!("failed to create temp file in {:?}: {}", self.dir, e)))?;
        let written = tmp.write_all(value.as_bytes()).and_then(|()| tmp.flush());
        written.map_err(|e| Error::Store(format!("failed to write {:?}: {}", tmp.path(), e)))?;
        tmp.persist(&path)
            .map_err(|e| Error::Store(format!("failed to replace {:?}: {}", path, e.error)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Store(format!("failed to remove {:?}: {}", path, e))),
        }
    }
}

/// In-process store, used by tests and embedders without a disk.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

/// Read the dark-mode flag; absent or unreadable means light mode.
pub fn load_dark_mode(store: &dyn KeyValueStore) -> bool {
    match store.get(DARK_MODE_KEY) {
        Ok(Some(value)) => value.trim() == "true",
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read theme preference");
            false
        }
    }
}

/// Persist the dark-mode flag, logging failures.
pub fn save_dark_mode(store: &dyn KeyValueStore, enabled: bool) {
    let value = if enabled { "true" } else { "false" };
    if let Err(e) = store.set(DARK_MODE_KEY, value) {
        tracing::warn!(error = %e, "Failed to save theme preference");
    }
}
