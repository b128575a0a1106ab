//! One-shot local-id initialisation.
//!
//! The local-id table must be built exactly once, before the RPC listener
//! accepts its first request.  [`LocalIdBoot`] gates that: the first
//! [`LocalIdBoot::initialize`] call allocates, every later call returns the
//! table that already exists.

use std::sync::{Arc, OnceLock};

use keymap_core::{allocate_local_ids, BehaviorRegistry, LocalIds, SettingsStore};
use tracing::{info, warn};

/// Holds the process-wide local-id table once it has been built.
#[derive(Default)]
pub struct LocalIdBoot {
    table: OnceLock<Arc<dyn LocalIds>>,
}

impl LocalIdBoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates local ids for `registry`, replaying and persisting through
    /// `settings`.  Runs at most once.
    pub fn initialize(
        &self,
        registry: &BehaviorRegistry,
        settings: &dyn SettingsStore,
    ) -> Arc<dyn LocalIds> {
        if let Some(existing) = self.table.get() {
            warn!("local ids already initialised; keeping the existing table");
            return existing.clone();
        }

        let table = self.table.get_or_init(|| {
            let table = allocate_local_ids(registry, settings);
            info!(behaviors = registry.len(), "behavior local ids ready");
            table
        });
        table.clone()
    }

    /// The table, if [`Self::initialize`] has run.
    pub fn get(&self) -> Option<Arc<dyn LocalIds>> {
        self.table.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.table.get().is_some()
    }
}
