//! Stable numeric identifiers for behaviors.
//!
//! A remote editor cannot reference behaviors by name cheaply, and names are
//! not guaranteed to stay stable across firmware builds.  Each behavior is
//! therefore given a small [`LocalId`] that is stable across reboots.  Two
//! strategies exist behind the [`LocalIds`] contract:
//!
//! - [`Crc16LocalIds`]: `id = CRC16(name)`.  Needs no storage.  Two names that
//!   hash to the same 16-bit value collide and nothing detects or resolves it;
//!   the first registered behavior wins lookups by id.
//! - [`SettingsTableLocalIds`]: ids are persisted under
//!   `behavior/local_id/<id>` and new ones are handed out from a counter that
//!   starts above the largest persisted id.  Ids are never reused.
//!
//! [`allocate_local_ids`] picks the strategy selected by the `local-id-crc16`
//! Cargo feature.

use std::fmt;
use std::sync::Arc;

use crc::{Crc, CRC_16_MODBUS};
use tracing::{debug, error, info, warn};

use crate::domain::behavior::{Behavior, BehaviorRegistry};
use crate::domain::settings::SettingsStore;

/// Settings namespace holding the persisted id table.
pub const SETTINGS_NAMESPACE: &str = "behavior";

/// Key prefix (inside [`SETTINGS_NAMESPACE`]) of one persisted id entry.
pub const LOCAL_ID_KEY: &str = "local_id";

/// Persisted names must be shorter than this many bytes.
pub const MAX_PERSISTED_NAME_LEN: usize = 64;

/// CRC-16/MODBUS: init 0xFFFF, reflected poly 0x8005, no final xor.
const NAME_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Small stable identifier of a behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LocalId(pub u16);

impl LocalId {
    /// Sentinel for "no id assigned yet".
    pub const UNASSIGNED: LocalId = LocalId(0);

    pub fn is_assigned(self) -> bool {
        self != Self::UNASSIGNED
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Two-way mapping between behavior names and local ids.
///
/// Both lookups skip behaviors that are not ready.
pub trait LocalIds: Send + Sync {
    /// Returns the id of the ready behavior called `name`.
    fn local_id(&self, name: &str) -> Option<LocalId>;

    /// Returns the registered name of the ready behavior with `id`.
    fn find_name(&self, id: LocalId) -> Option<Arc<str>>;
}

#[derive(Debug, Clone)]
struct IdentityEntry {
    behavior: Behavior,
    id: LocalId,
}

/// Registry-sized table shared by both strategies.
#[derive(Debug, Clone, Default)]
struct IdentityTable {
    entries: Vec<IdentityEntry>,
}

impl IdentityTable {
    fn unassigned(registry: &BehaviorRegistry) -> Self {
        Self {
            entries: registry
                .iter()
                .map(|behavior| IdentityEntry {
                    behavior: behavior.clone(),
                    id: LocalId::UNASSIGNED,
                })
                .collect(),
        }
    }

    fn local_id(&self, name: &str) -> Option<LocalId> {
        if name.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.behavior.is_ready() && e.behavior.name().as_ref() == name)
            .map(|e| e.id)
    }

    fn find_name(&self, id: LocalId) -> Option<Arc<str>> {
        self.entries
            .iter()
            .find(|e| e.behavior.is_ready() && e.id == id)
            .map(|e| Arc::clone(e.behavior.name()))
    }
}

// ── CRC16 strategy ────────────────────────────────────────────────────────────

/// Ids derived from a CRC16 of each behavior name.
#[derive(Debug, Clone)]
pub struct Crc16LocalIds {
    table: IdentityTable,
}

impl Crc16LocalIds {
    pub fn new(registry: &BehaviorRegistry) -> Self {
        let mut table = IdentityTable::unassigned(registry);
        for entry in &mut table.entries {
            entry.id = crc16_local_id(entry.behavior.name());
            debug!(name = %entry.behavior.name(), id = %entry.id, "derived behavior local id");
        }
        Self { table }
    }
}

/// CRC16 of the name bytes.
pub fn crc16_local_id(name: &str) -> LocalId {
    LocalId(NAME_CRC.checksum(name.as_bytes()))
}

impl LocalIds for Crc16LocalIds {
    fn local_id(&self, name: &str) -> Option<LocalId> {
        self.table.local_id(name)
    }

    fn find_name(&self, id: LocalId) -> Option<Arc<str>> {
        self.table.find_name(id)
    }
}

// ── Settings-table strategy ───────────────────────────────────────────────────

/// Ids persisted in the settings store and allocated from a counter.
#[derive(Debug, Clone)]
pub struct SettingsTableLocalIds {
    table: IdentityTable,
    largest: u16,
}

impl SettingsTableLocalIds {
    /// Replays the persisted table, then assigns and persists an id for every
    /// behavior that is still unassigned.
    ///
    /// Never fails: unreadable storage, malformed entries and failed writes
    /// are logged.  A failed write keeps the id in memory.
    pub fn load(registry: &BehaviorRegistry, settings: &dyn SettingsStore) -> Self {
        let mut ids = Self {
            table: IdentityTable::unassigned(registry),
            largest: 0,
        };
        ids.replay(settings);
        ids.fill(settings);
        ids
    }

    fn replay(&mut self, settings: &dyn SettingsStore) {
        let entries = match settings.load_subtree(SETTINGS_NAMESPACE) {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "failed to load persisted behavior local ids");
                return;
            }
        };

        for (key, value) in entries {
            let Some(suffix) = key
                .strip_prefix(LOCAL_ID_KEY)
                .and_then(|rest| rest.strip_prefix('/'))
            else {
                debug!(key = %key, "ignoring behavior setting");
                continue;
            };

            let id = match suffix.parse::<u16>() {
                Ok(0) | Err(_) => {
                    warn!(key = %key, "invalid behavior local id");
                    continue;
                }
                Ok(id) => LocalId(id),
            };

            if value.len() >= MAX_PERSISTED_NAME_LEN {
                error!(
                    key = %key,
                    len = value.len(),
                    max = MAX_PERSISTED_NAME_LEN,
                    "persisted behavior name too large"
                );
                continue;
            }

            let Ok(name) = std::str::from_utf8(&value) else {
                error!(key = %key, "persisted behavior name is not valid UTF-8");
                continue;
            };

            match self
                .table
                .entries
                .iter_mut()
                .find(|e| e.behavior.name().as_ref() == name)
            {
                Some(entry) => {
                    entry.id = id;
                    self.largest = self.largest.max(id.0);
                    debug!(name, %id, "restored behavior local id");
                }
                None => error!(name, %id, "persisted local id names an unknown behavior"),
            }
        }
    }

    fn fill(&mut self, settings: &dyn SettingsStore) {
        for entry in &mut self.table.entries {
            if entry.id.is_assigned() {
                continue;
            }

            let Some(next) = self.largest.checked_add(1) else {
                error!(name = %entry.behavior.name(), "behavior local ids exhausted");
                continue;
            };
            self.largest = next;
            entry.id = LocalId(next);
            info!(name = %entry.behavior.name(), id = %entry.id, "allocated behavior local id");

            let key = format!("{SETTINGS_NAMESPACE}/{LOCAL_ID_KEY}/{}", entry.id);
            if let Err(e) = settings.save_one(&key, entry.behavior.name().as_bytes()) {
                error!(key = %key, error = %e, "failed to persist behavior local id");
            }
        }
    }
}

impl LocalIds for SettingsTableLocalIds {
    fn local_id(&self, name: &str) -> Option<LocalId> {
        self.table.local_id(name)
    }

    fn find_name(&self, id: LocalId) -> Option<Arc<str>> {
        self.table.find_name(id)
    }
}

/// Builds the id table using the strategy selected at build time.
pub fn allocate_local_ids(
    registry: &BehaviorRegistry,
    settings: &dyn SettingsStore,
) -> Arc<dyn LocalIds> {
    if cfg!(feature = "local-id-crc16") {
        Arc::new(Crc16LocalIds::new(registry))
    } else {
        Arc::new(SettingsTableLocalIds::load(registry, settings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::behavior::{MockBehaviorDriver, StaticBehavior};
    use crate::domain::settings::{MemorySettings, SettingsError};

    fn registry(names: &[&str]) -> BehaviorRegistry {
        BehaviorRegistry::new(
            names
                .iter()
                .map(|n| Behavior::new(*n, Arc::new(StaticBehavior)))
                .collect(),
        )
    }

    /// Store whose writes always fail.
    struct ReadOnlySettings(MemorySettings);

    impl SettingsStore for ReadOnlySettings {
        fn load_subtree(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, SettingsError> {
            self.0.load_subtree(prefix)
        }
        fn save_one(&self, _key: &str, _value: &[u8]) -> Result<(), SettingsError> {
            Err(SettingsError::Backend("read-only".to_string()))
        }
        fn delete(&self, _key: &str) -> Result<(), SettingsError> {
            Err(SettingsError::Backend("read-only".to_string()))
        }
    }

    #[test]
    fn test_crc16_matches_crc16_ansi_check_value() {
        assert_eq!(crc16_local_id("123456789"), LocalId(0x4B37));
    }

    #[test]
    fn test_crc16_strategy_resolves_both_directions() {
        let registry = registry(&["key_press", "mod_tap"]);
        let ids = Crc16LocalIds::new(&registry);

        let id = ids.local_id("mod_tap").unwrap();

        assert_eq!(id, crc16_local_id("mod_tap"));
        assert_eq!(ids.find_name(id).as_deref(), Some("mod_tap"));
    }

    #[test]
    fn test_fresh_store_assigns_ids_in_registration_order() {
        // Arrange
        let registry = registry(&["key_press", "momentary_layer", "mod_tap"]);
        let settings = MemorySettings::new();

        // Act
        let ids = SettingsTableLocalIds::load(&registry, &settings);

        // Assert
        for (expected, name) in [(1, "key_press"), (2, "momentary_layer"), (3, "mod_tap")] {
            assert_eq!(ids.local_id(name), Some(LocalId(expected)));
            assert_eq!(ids.find_name(LocalId(expected)).as_deref(), Some(name));
        }
        assert_eq!(
            settings.get("behavior/local_id/2").unwrap(),
            Some(b"momentary_layer".to_vec())
        );
    }

    #[test]
    fn test_persisted_ids_are_reused_and_new_ids_start_above_largest() {
        // Arrange
        let registry = registry(&["key_press", "momentary_layer", "mod_tap"]);
        let settings = MemorySettings::with_entries([
            ("behavior/local_id/7", b"mod_tap".to_vec()),
            ("behavior/local_id/3", b"key_press".to_vec()),
        ]);

        // Act
        let ids = SettingsTableLocalIds::load(&registry, &settings);

        // Assert
        assert_eq!(ids.local_id("key_press"), Some(LocalId(3)));
        assert_eq!(ids.local_id("mod_tap"), Some(LocalId(7)));
        assert_eq!(ids.local_id("momentary_layer"), Some(LocalId(8)));
    }

    #[test]
    fn test_entry_for_unknown_behavior_is_dropped() {
        // Arrange: id 5 names a behavior that no longer exists
        let registry = registry(&["key_press", "mod_tap"]);
        let settings = MemorySettings::with_entries([(
            "behavior/local_id/5",
            b"removed_behavior".to_vec(),
        )]);

        // Act
        let ids = SettingsTableLocalIds::load(&registry, &settings);

        // Assert: allocation for the others is unaffected
        assert_eq!(ids.local_id("key_press"), Some(LocalId(1)));
        assert_eq!(ids.local_id("mod_tap"), Some(LocalId(2)));
        assert!(ids.find_name(LocalId(5)).is_none());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let long_name = vec![b'x'; MAX_PERSISTED_NAME_LEN];
        let registry = registry(&["key_press"]);
        let settings = MemorySettings::with_entries([
            ("behavior/local_id/abc", b"key_press".to_vec()),
            ("behavior/local_id/0", b"key_press".to_vec()),
            ("behavior/local_id/70000", b"key_press".to_vec()),
            ("behavior/local_id/9", long_name),
            ("behavior/local_id/10", vec![0xFF, 0xFE]),
            ("behavior/other/1", b"key_press".to_vec()),
        ]);

        let ids = SettingsTableLocalIds::load(&registry, &settings);

        assert_eq!(ids.local_id("key_press"), Some(LocalId(1)));
    }

    #[test]
    fn test_failed_write_back_keeps_id_in_memory() {
        let registry = registry(&["key_press"]);
        let settings = ReadOnlySettings(MemorySettings::new());

        let ids = SettingsTableLocalIds::load(&registry, &settings);

        assert_eq!(ids.local_id("key_press"), Some(LocalId(1)));
    }

    #[test]
    fn test_behavior_that_is_not_ready_has_no_id() {
        let mut driver = MockBehaviorDriver::new();
        driver.expect_is_ready().return_const(false);
        let registry = BehaviorRegistry::new(vec![Behavior::new("sleepy", Arc::new(driver))]);

        let ids = SettingsTableLocalIds::load(&registry, &MemorySettings::new());

        assert!(ids.local_id("sleepy").is_none());
        assert!(ids.find_name(LocalId(1)).is_none());
    }

    #[test]
    fn test_empty_name_has_no_id() {
        let ids = Crc16LocalIds::new(&registry(&["key_press"]));
        assert!(ids.local_id("").is_none());
    }
}
