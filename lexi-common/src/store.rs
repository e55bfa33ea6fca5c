//! Key-value snapshot store
//!
//! One JSON object on disk, one serialized blob per key. Writes go to a
//! temporary sibling file and are renamed into place, so a crash mid-write
//! leaves the previous snapshot intact.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default file name inside the root folder
pub const STORE_FILE_NAME: &str = "lexi.json";

/// File-backed key-value store
pub struct KeyValueStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl KeyValueStore {
    /// Open (or lazily create) the store at `path`
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the store at `<root_folder>/lexi.json`
    pub fn in_root_folder(root_folder: &Path) -> Self {
        Self::open(root_folder.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and deserialize the value stored under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let map = self.read_map()?;
        match map.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` and store it under `key`, replacing any previous blob
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Internal("store write lock poisoned".to_string()))?;

        let mut map = self.read_map()?;
        map.insert(key.to_string(), serde_json::to_value(value)?);
        self.write_map(&map)?;

        tracing::debug!(key, path = %self.path.display(), "Snapshot written");
        Ok(())
    }

    /// Remove `key`; returns whether it existed
    pub fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Internal("store write lock poisoned".to_string()))?;

        let mut map = self.read_map()?;
        let existed = map.remove(key).is_some();
        if existed {
            self.write_map(&map)?;
        }
        Ok(existed)
    }

    fn read_map(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::InvalidInput(format!(
                "Store file {} does not hold a JSON object",
                self.path.display()
            ))),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, serde_json::to_vec_pretty(map)?)?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}
