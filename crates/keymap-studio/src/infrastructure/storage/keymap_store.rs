//! Settings-backed keymap.
//!
//! The keymap starts from the configured default layers.  Any layer saved
//! earlier is stored under `keymap/l/<layer>` and replaces the default at
//! load time.  Edits change only the in-memory copy until
//! [`KeymapStore::save_changes`] writes every layer that differs from what
//! was last saved.

use std::sync::Arc;

use keymap_core::{BehaviorBinding, BehaviorRegistry, SettingsStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::keymap_rpc::{KeymapStore, KeymapStoreError};
use crate::infrastructure::storage::config::{BindingEntry, LayerEntry};

/// Settings subtree holding saved layers.
pub const KEYMAP_NAMESPACE: &str = "keymap";

/// Persisted form of one cell.  Behaviors are stored by name so saved layers
/// stay valid when local ids are reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoredBinding {
    behavior: Option<String>,
    param1: u32,
    param2: u32,
}

/// [`KeymapStore`] persisted through a [`SettingsStore`].
pub struct SettingsKeymap {
    names: Vec<Option<String>>,
    current: Vec<Vec<BehaviorBinding>>,
    saved: Vec<Vec<BehaviorBinding>>,
    settings: Arc<dyn SettingsStore>,
}

impl SettingsKeymap {
    /// Builds the keymap from `layers`, sized to `key_count` positions per
    /// layer, then applies saved layers from `settings`.
    pub fn load(
        layers: &[LayerEntry],
        key_count: usize,
        registry: &BehaviorRegistry,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let names = layers.iter().map(|layer| layer.name.clone()).collect();
        let mut current: Vec<Vec<BehaviorBinding>> = layers
            .iter()
            .map(|layer| {
                let mut bindings: Vec<BehaviorBinding> = layer
                    .bindings
                    .iter()
                    .map(|entry| configured_binding(registry, entry))
                    .collect();
                bindings.resize(key_count, BehaviorBinding::empty());
                bindings
            })
            .collect();

        match settings.load_subtree(KEYMAP_NAMESPACE) {
            Ok(entries) => {
                for (key, value) in entries {
                    apply_saved_layer(registry, &mut current, key_count, &key, &value);
                }
            }
            Err(e) => warn!(error = %e, "could not read saved keymap; using defaults"),
        }

        info!(layers = current.len(), key_count, "keymap loaded");
        Self {
            names,
            saved: current.clone(),
            current,
            settings,
        }
    }

    fn stored_layer(&self, layer: usize) -> Vec<StoredBinding> {
        self.current[layer]
            .iter()
            .map(|binding| StoredBinding {
                behavior: binding.behavior_name().map(str::to_string),
                param1: binding.param1,
                param2: binding.param2,
            })
            .collect()
    }

    fn check_layer(&self, layer: usize) -> Result<(), KeymapStoreError> {
        if layer < self.current.len() {
            Ok(())
        } else {
            Err(KeymapStoreError::InvalidLocation { layer, position: 0 })
        }
    }
}

fn layer_key(layer: usize) -> String {
    format!("{KEYMAP_NAMESPACE}/l/{layer}")
}

/// Uses the registry's own name allocation when the behavior is known.
fn intern(registry: &BehaviorRegistry, name: &str) -> Arc<str> {
    match registry.lookup_by_name(name) {
        Some(behavior) => behavior.name().clone(),
        None => {
            warn!(behavior = name, "keymap refers to an unknown behavior");
            Arc::from(name)
        }
    }
}

fn configured_binding(registry: &BehaviorRegistry, entry: &BindingEntry) -> BehaviorBinding {
    match &entry.behavior {
        Some(name) => BehaviorBinding::new(intern(registry, name), entry.param1, entry.param2),
        None => BehaviorBinding::empty(),
    }
}

fn apply_saved_layer(
    registry: &BehaviorRegistry,
    layers: &mut [Vec<BehaviorBinding>],
    key_count: usize,
    key: &str,
    value: &[u8],
) {
    let Some(layer) = key.strip_prefix("l/").and_then(|n| n.parse::<usize>().ok()) else {
        debug!(key, "ignoring unrelated keymap setting");
        return;
    };
    let Some(slot) = layers.get_mut(layer) else {
        warn!(layer, "saved keymap layer does not exist; ignoring");
        return;
    };

    match bincode::deserialize::<Vec<StoredBinding>>(value) {
        Ok(stored) => {
            *slot = stored
                .into_iter()
                .map(|b| match b.behavior {
                    Some(name) => BehaviorBinding::new(intern(registry, &name), b.param1, b.param2),
                    None => BehaviorBinding::empty(),
                })
                .collect();
            if slot.len() > key_count {
                warn!(
                    layer,
                    saved = slot.len(),
                    key_count,
                    "saved layer is longer than the layout; truncating"
                );
            }
            slot.resize(key_count, BehaviorBinding::empty());
            debug!(layer, positions = slot.len(), "applied saved layer");
        }
        Err(e) => warn!(layer, error = %e, "saved keymap layer is corrupt; using default"),
    }
}

impl KeymapStore for SettingsKeymap {
    fn layer_count(&self) -> usize {
        self.current.len()
    }

    fn layer_name(&self, layer: usize) -> Option<&str> {
        self.names.get(layer)?.as_deref()
    }

    fn layer_len(&self, layer: usize) -> usize {
        self.current.get(layer).map_or(0, Vec::len)
    }

    fn binding_at(&self, layer: usize, position: usize) -> Option<&BehaviorBinding> {
        self.current.get(layer)?.get(position)
    }

    fn set_binding_at(
        &mut self,
        layer: usize,
        position: usize,
        binding: BehaviorBinding,
    ) -> Result<(), KeymapStoreError> {
        let cell = self
            .current
            .get_mut(layer)
            .and_then(|bindings| bindings.get_mut(position))
            .ok_or(KeymapStoreError::InvalidLocation { layer, position })?;
        *cell = binding;
        Ok(())
    }

    fn replace_layer(
        &mut self,
        layer: usize,
        bindings: Vec<BehaviorBinding>,
    ) -> Result<(), KeymapStoreError> {
        self.check_layer(layer)?;
        self.current[layer] = bindings;
        Ok(())
    }

    fn check_unsaved_changes(&self) -> bool {
        self.current != self.saved
    }

    fn save_changes(&mut self) -> Result<(), KeymapStoreError> {
        for layer in 0..self.current.len() {
            if self.current[layer] == self.saved[layer] {
                continue;
            }

            let bytes = bincode::serialize(&self.stored_layer(layer))
                .map_err(|e| KeymapStoreError::Storage(format!("encoding layer {layer}: {e}")))?;
            self.settings
                .save_one(&layer_key(layer), &bytes)
                .map_err(|e| KeymapStoreError::Storage(e.to_string()))?;

            self.saved[layer] = self.current[layer].clone();
            debug!(layer, "layer saved");
        }
        Ok(())
    }

    fn discard_changes(&mut self) -> Result<(), KeymapStoreError> {
        self.current = self.saved.clone();
        Ok(())
    }
}
