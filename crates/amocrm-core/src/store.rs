//! Abstract key-value settings store.
//!
//! The integration never talks to a concrete options registry; config input
//! and persisted client state (auth blob, account-info blob) go through this
//! trait. The embedding application decides where the blobs actually live.

use crate::error::{AmoError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Store key for the configuration blob
pub const SETTINGS_KEY: &str = "amocrm_settings";

/// Store key for the persisted OAuth credential blob
pub const AUTH_KEY: &str = "amocrm_auth";

/// Store key for the persisted account metadata blob
pub const ACCOUNT_INFO_KEY: &str = "amocrm_account_info";

/// Key-value blob store. Writes must be durable before `put` returns so a
/// client constructed afterwards observes the latest state.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Read a JSON blob into a typed value. A missing key yields `None`; a blob
/// that fails to decode is reported, not silently dropped.
pub fn get_json<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize a value and write it through to the store.
pub fn put_json<T: Serialize>(store: &dyn SettingsStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw)
}

/// In-memory store for tests and short-lived embeddings
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AmoError::Store("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AmoError::Store("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// File-backed store keeping one JSON blob per key under a data directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}
