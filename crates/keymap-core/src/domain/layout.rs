//! Physical key layouts and position maps.
//!
//! A keyboard may ship several *physical layouts* for the same PCB (ANSI vs
//! ISO, split space bar, ...).  Each layout lists its keys in position order
//! with their geometry.  When the active layout changes, a [`PositionMap`]
//! tells the migrator which old key position corresponds to each new one.
//!
//! Correspondence is resolved in two steps:
//!
//! 1. **Explicit groups.**  A [`PositionMapGroup`] lists, per layout id, a
//!    sequence of positions; the same index in every list is the same physical
//!    key.  Groups are consulted in declaration order.
//! 2. **Geometry.**  New positions that no group covers are matched against
//!    unused old keys with the same `(x, y)` origin.
//!
//! Anything still unmatched has no correspondence and migrates to an empty
//! binding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Wire/sentinel value for "no corresponding old position".
pub const POSITION_SENTINEL: u32 = u32::MAX;

/// Errors that can occur when resolving layouts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutError {
    /// The layout index does not exist.
    #[error("unknown physical layout index: {0}")]
    UnknownLayout(usize),

    /// A position-map group references a key the layout does not have.
    #[error("position {position} is out of range for layout {layout:?}")]
    PositionOutOfRange { layout: String, position: u32 },
}

/// Geometry of one key, in hundredths of a key unit.
///
/// `r` is the rotation in hundredths of a degree around `(rx, ry)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPhysicalAttrs {
    pub width: i32,
    pub height: i32,
    pub x: i32,
    pub y: i32,
    pub r: i32,
    pub rx: i32,
    pub ry: i32,
}

/// One selectable physical layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalLayout {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub keys: Vec<KeyPhysicalAttrs>,
}

impl PhysicalLayout {
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

/// Positions of the same physical keys across several layouts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionMapGroup {
    /// Layout id → key positions; index `i` of every list is the same key.
    pub positions: BTreeMap<String, Vec<u32>>,
}

/// For each position of the new layout, the old position it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMap {
    entries: Vec<Option<u32>>,
}

impl PositionMap {
    pub fn new(entries: Vec<Option<u32>>) -> Self {
        Self { entries }
    }

    /// Builds a map from raw positions where [`POSITION_SENTINEL`] means none.
    pub fn from_raw(raw: &[u32]) -> Self {
        Self {
            entries: raw
                .iter()
                .map(|&p| (p != POSITION_SENTINEL).then_some(p))
                .collect(),
        }
    }

    /// Identity map over `len` positions.
    pub fn identity(len: usize) -> Self {
        Self {
            entries: (0..len).map(|p| Some(p as u32)).collect(),
        }
    }

    /// Number of positions in the new layout.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Old position for `new_position`, or `None` when there is no match.
    pub fn get(&self, new_position: usize) -> Option<u32> {
        self.entries.get(new_position).copied().flatten()
    }

    pub fn to_raw(&self) -> Vec<u32> {
        self.entries
            .iter()
            .map(|e| e.unwrap_or(POSITION_SENTINEL))
            .collect()
    }
}

/// All physical layouts of the device plus their position-map groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhysicalLayoutSet {
    layouts: Vec<PhysicalLayout>,
    position_maps: Vec<PositionMapGroup>,
}

impl PhysicalLayoutSet {
    pub fn new(layouts: Vec<PhysicalLayout>, position_maps: Vec<PositionMapGroup>) -> Self {
        Self {
            layouts,
            position_maps,
        }
    }

    /// Layouts in registration order.
    pub fn layouts(&self) -> &[PhysicalLayout] {
        &self.layouts
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownLayout`] if `index` is out of range.
    pub fn get(&self, index: usize) -> Result<&PhysicalLayout, LayoutError> {
        self.layouts
            .get(index)
            .ok_or(LayoutError::UnknownLayout(index))
    }

    /// Computes the new→old position map between two layouts.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::UnknownLayout`] for a bad index and
    /// [`LayoutError::PositionOutOfRange`] for a group entry outside a layout.
    pub fn position_map(&self, old: usize, new: usize) -> Result<PositionMap, LayoutError> {
        let old_layout = self.get(old)?;
        let new_layout = self.get(new)?;

        if old == new {
            return Ok(PositionMap::identity(new_layout.key_count()));
        }

        let mut entries: Vec<Option<u32>> = vec![None; new_layout.key_count()];
        let mut used = vec![false; old_layout.key_count()];

        for group in &self.position_maps {
            let (Some(old_positions), Some(new_positions)) = (
                group.positions.get(&old_layout.id),
                group.positions.get(&new_layout.id),
            ) else {
                continue;
            };

            for (&old_pos, &new_pos) in old_positions.iter().zip(new_positions) {
                check_position(old_layout, old_pos)?;
                check_position(new_layout, new_pos)?;

                let slot = &mut entries[new_pos as usize];
                if slot.is_none() && !used[old_pos as usize] {
                    *slot = Some(old_pos);
                    used[old_pos as usize] = true;
                }
            }
        }

        for (new_pos, slot) in entries.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let key = &new_layout.keys[new_pos];
            let matched = old_layout
                .keys
                .iter()
                .enumerate()
                .find(|(old_pos, old_key)| {
                    !used[*old_pos] && old_key.x == key.x && old_key.y == key.y
                })
                .map(|(old_pos, _)| old_pos);

            if let Some(old_pos) = matched {
                used[old_pos] = true;
                *slot = Some(old_pos as u32);
            }
        }

        debug!(
            old = %old_layout.id,
            new = %new_layout.id,
            mapped = entries.iter().filter(|e| e.is_some()).count(),
            total = entries.len(),
            "computed position map"
        );
        Ok(PositionMap::new(entries))
    }
}

fn check_position(layout: &PhysicalLayout, position: u32) -> Result<(), LayoutError> {
    if (position as usize) < layout.key_count() {
        Ok(())
    } else {
        Err(LayoutError::PositionOutOfRange {
            layout: layout.id.clone(),
            position,
        })
    }
}
