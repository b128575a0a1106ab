//! Keymap migration between physical layouts.
//!
//! When the active physical layout changes, every layer is rebuilt for the
//! new key count: for each new position the position map names the old
//! position whose binding moves there, or nothing, in which case the cell is
//! cleared.  Each layer is built completely before it replaces the old one,
//! so a store failure never leaves a half-written layer behind.

use keymap_core::BehaviorBinding;
use thiserror::Error;
use tracing::{debug, warn};

use crate::application::keymap_rpc::{
    KeymapStore, KeymapStoreError, LayoutStoreError, PhysicalLayoutStore,
};

/// Error type for [`migrate_keymap`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrationError {
    /// No position map exists between the two layouts.  Nothing was changed.
    #[error("cannot map key positions: {0}")]
    PositionMap(#[from] LayoutStoreError),

    /// Writing a migrated layer failed.  Earlier layers are already migrated.
    #[error("failed to store migrated layer {layer}: {source}")]
    Store {
        layer: usize,
        #[source]
        source: KeymapStoreError,
    },
}

/// Counts describing a completed migration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Layers rewritten.
    pub layers: usize,
    /// Positions per layer in the new layout.
    pub positions: usize,
    /// Cells that received a binding from the old layout.
    pub copied: usize,
    /// Cells left empty.
    pub cleared: usize,
}

/// Rewrites every layer of `keymap` from layout `old` to the layout currently
/// selected in `layouts`.
///
/// # Errors
///
/// Returns [`MigrationError::PositionMap`] when the layouts cannot be mapped
/// and [`MigrationError::Store`] when a layer cannot be written.
pub fn migrate_keymap<K, L>(
    keymap: &mut K,
    layouts: &L,
    old: usize,
) -> Result<MigrationSummary, MigrationError>
where
    K: KeymapStore + ?Sized,
    L: PhysicalLayoutStore + ?Sized,
{
    let new = layouts.selected();
    let map = layouts.position_map(old, new)?;
    let positions = map.len();
    let mut summary = MigrationSummary {
        positions,
        ..Default::default()
    };

    for layer in 0..keymap.layer_count() {
        let migrated: Vec<BehaviorBinding> = (0..positions)
            .map(|position| {
                map.get(position)
                    .and_then(|old_position| keymap.binding_at(layer, old_position as usize))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect();

        let copied = migrated.iter().filter(|b| !b.is_empty()).count();
        debug!(layer, copied, positions, "migrated layer");

        keymap
            .replace_layer(layer, migrated)
            .map_err(|source| {
                warn!(layer, error = %source, "layer migration aborted");
                MigrationError::Store { layer, source }
            })?;

        summary.layers += 1;
        summary.copied += copied;
        summary.cleared += positions - copied;
    }

    Ok(summary)
}
