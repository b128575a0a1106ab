//! Settings-backed physical layout selection.
//!
//! The selected layout index is persisted as a single byte under
//! `physical_layouts/selected`.

use std::sync::Arc;

use keymap_core::{LayoutError, PhysicalLayout, PhysicalLayoutSet, PositionMap, SettingsStore};
use tracing::{debug, info, warn};

use crate::application::keymap_rpc::{LayoutStoreError, PhysicalLayoutStore};

/// Settings subtree for layout state.
pub const LAYOUT_NAMESPACE: &str = "physical_layouts";

const SELECTED_KEY: &str = "selected";

/// [`PhysicalLayoutStore`] persisted through a [`SettingsStore`].
pub struct SettingsPhysicalLayouts {
    set: PhysicalLayoutSet,
    selected: usize,
    saved: usize,
    settings: Arc<dyn SettingsStore>,
}

impl SettingsPhysicalLayouts {
    /// Restores the saved selection, falling back to the first layout when
    /// nothing valid was saved.
    pub fn load(set: PhysicalLayoutSet, settings: Arc<dyn SettingsStore>) -> Self {
        let saved = match settings.load_subtree(LAYOUT_NAMESPACE) {
            Ok(entries) => entries
                .iter()
                .find(|(key, _)| key == SELECTED_KEY)
                .and_then(|(_, value)| match value.as_slice() {
                    [index] if usize::from(*index) < set.len() => Some(usize::from(*index)),
                    other => {
                        warn!(?other, layouts = set.len(), "ignoring invalid saved layout selection");
                        None
                    }
                })
                .unwrap_or(0),
            Err(e) => {
                warn!(error = %e, "could not read saved layout selection");
                0
            }
        };

        info!(selected = saved, layouts = set.len(), "physical layouts loaded");
        Self {
            set,
            selected: saved,
            saved,
            settings,
        }
    }

    /// Key count of the selected layout, 0 when there are no layouts.
    pub fn selected_key_count(&self) -> usize {
        self.set
            .get(self.selected)
            .map_or(0, PhysicalLayout::key_count)
    }
}

impl PhysicalLayoutStore for SettingsPhysicalLayouts {
    fn layouts(&self) -> &[PhysicalLayout] {
        self.set.layouts()
    }

    fn selected(&self) -> usize {
        self.selected
    }

    fn select(&mut self, index: usize) -> Result<(), LayoutStoreError> {
        self.set
            .get(index)
            .map_err(|_| LayoutStoreError::UnknownLayout(index))?;
        debug!(from = self.selected, to = index, "physical layout selected");
        self.selected = index;
        Ok(())
    }

    fn position_map(&self, old: usize, new: usize) -> Result<PositionMap, LayoutStoreError> {
        self.set.position_map(old, new).map_err(|e| match e {
            LayoutError::UnknownLayout(index) => LayoutStoreError::UnknownLayout(index),
            other => LayoutStoreError::PositionMap {
                old,
                new,
                reason: other.to_string(),
            },
        })
    }

    fn check_unsaved_selection(&self) -> bool {
        self.selected != self.saved
    }

    fn save_selected(&mut self) -> Result<(), LayoutStoreError> {
        if self.selected == self.saved {
            return Ok(());
        }

        let byte = u8::try_from(self.selected).map_err(|_| {
            LayoutStoreError::Storage(format!("layout index {} does not fit a byte", self.selected))
        })?;
        self.settings
            .save_one(&format!("{LAYOUT_NAMESPACE}/{SELECTED_KEY}"), &[byte])
            .map_err(|e| LayoutStoreError::Storage(e.to_string()))?;

        self.saved = self.selected;
        Ok(())
    }

    fn revert_selected(&mut self) -> Result<(), LayoutStoreError> {
        self.selected = self.saved;
        Ok(())
    }
}
