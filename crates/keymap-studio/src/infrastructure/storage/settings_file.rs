//! File-backed settings store.
//!
//! The whole key space is held in memory as a `BTreeMap` and written back as
//! a single bincode blob after every change.  Writes go to a sibling `.tmp`
//! file that is then renamed over the real one, so a crash mid-write leaves
//! the previous contents intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keymap_core::domain::settings::relative_key;
use keymap_core::{SettingsError, SettingsStore};
use tracing::{debug, info, warn};

/// [`SettingsStore`] persisted to a single file.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl FileSettings {
    /// Opens the store at `path`.
    ///
    /// A missing file starts an empty store.  A file that cannot be decoded
    /// is logged and also treated as empty; it is overwritten by the next
    /// save.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Backend`] when the file exists but cannot be
    /// read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();

        let entries = match std::fs::read(&path) {
            Ok(bytes) => match bincode::deserialize::<BTreeMap<String, Vec<u8>>>(&bytes) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "settings loaded");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "settings file is corrupt; starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file yet");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(SettingsError::Backend(format!(
                    "reading {}: {e}",
                    path.display()
                )))
            }
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, Vec<u8>>) -> Result<(), SettingsError> {
        let bytes = bincode::serialize(entries)
            .map_err(|e| SettingsError::Backend(format!("encoding settings: {e}")))?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                SettingsError::Backend(format!("creating {}: {e}", dir.display()))
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .map_err(|e| SettingsError::Backend(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            SettingsError::Backend(format!("replacing {}: {e}", self.path.display()))
        })
    }
}

impl SettingsStore for FileSettings {
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
        let previous = entries.insert(key.to_string(), value.to_vec());

        if let Err(e) = self.persist(&entries) {
            // keep memory and disk in step
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        debug!(key, len = value.len(), "setting saved");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SettingsError> {
        let mut entries = self.entries.lock().map_err(|_| SettingsError::Poisoned)?;
        let Some(previous) = entries.remove(key) else {
            return Ok(());
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.to_string(), previous);
            return Err(e);
        }
        debug!(key, "setting deleted");
        Ok(())
    }
}
