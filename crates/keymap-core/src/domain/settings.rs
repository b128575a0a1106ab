//! Key-value settings store contract.
//!
//! Keys are `/`-separated paths such as `behavior/local_id/3`.  A *subtree*
//! is every key below a prefix; [`SettingsStore::load_subtree`] returns those
//! keys relative to the prefix (`local_id/3` for the prefix `behavior`).
//!
//! The byte-level reliability of the store is assumed.  This module only
//! defines the contract plus [`MemorySettings`], an in-memory backend used by
//! tests and by devices configured without persistent storage.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

/// Errors reported by a settings backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// The backend failed to read or write.
    #[error("settings backend error: {0}")]
    Backend(String),

    /// The backend's internal lock was poisoned by a panicking writer.
    #[error("settings store lock poisoned")]
    Poisoned,
}

/// Persistent key-value storage.
pub trait SettingsStore: Send + Sync {
    /// Returns every `(relative_key, value)` pair stored below `prefix`,
    /// ordered by key.
    fn load_subtree(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, SettingsError>;

    /// Writes `value` under `key`, returning once the write completed.
    fn save_one(&self, key: &str, value: &[u8]) -> Result<(), SettingsError>;

    /// Removes `key`.  Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), SettingsError>;
}

/// Strips `prefix/` from `key`, returning `None` for keys outside the subtree.
pub fn relative_key<'k>(key: &'k str, prefix: &str) -> Option<&'k str> {
    if prefix.is_empty() {
        return Some(key);
    }
    key.strip_prefix(prefix)?.strip_prefix('/')
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    /// Returns a copy of the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SettingsError> {
        let entries = self.entries.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }
}

impl SettingsStore for MemorySettings {
    fn load_subtree(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, SettingsError> {
        let entries = self.entries.lock().map_err(|_| SettingsError::Poisoned)?;
        Ok(entries
            .iter()
            .filter_map(|(key, value)| {
                relative_key(key, prefix).map(|rel| (rel.to_string(), value.clone()))
            })
            .collect())
    }

    fn save_one(&self, key: &str, value: &[u8]) -> Result<(), SettingsError> {
        let mut entries = self.entries.lock().map_err(|_| SettingsError::Poisoned)?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SettingsError> {
        let mut entries = self.entries.lock().map_err(|_| SettingsError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
