//! Device assembly: turns a [`DeviceConfig`] into a running keymap service.
//!
//! Boot order matters: the behavior registry is built first, then the local
//! id table is allocated (replaying and persisting through settings), and only
//! then are the layout and keymap stores loaded.

use std::sync::Arc;

use anyhow::Context;
use keymap_core::{MemorySettings, PhysicalLayoutSet, SettingsStore};
use tracing::info;

use crate::application::keymap_rpc::{KeymapRpcService, NotificationSink};
use crate::application::startup::LocalIdBoot;
use crate::infrastructure::behaviors::build_registry;
use crate::infrastructure::storage::config::{DeviceConfig, DeviceSection, SettingsBackend};
use crate::infrastructure::storage::keymap_store::SettingsKeymap;
use crate::infrastructure::storage::layout_store::SettingsPhysicalLayouts;
use crate::infrastructure::storage::settings_file::FileSettings;

/// The concrete service the binary runs.
pub type DeviceService = KeymapRpcService<SettingsKeymap, SettingsPhysicalLayouts>;

/// Opens the settings backend named in the `[device]` section.
///
/// # Errors
///
/// Returns an error if the settings file path cannot be resolved or the file
/// exists but cannot be read.
pub fn open_settings(device: &DeviceSection) -> anyhow::Result<Arc<dyn SettingsStore>> {
    match device.settings_backend {
        SettingsBackend::Memory => {
            info!("using in-memory settings; nothing will survive a restart");
            Ok(Arc::new(MemorySettings::new()))
        }
        SettingsBackend::File => {
            let path = device
                .resolved_settings_path()
                .context("failed to resolve settings file path")?;
            let settings = FileSettings::open(&path)
                .with_context(|| format!("failed to open settings at {}", path.display()))?;
            Ok(Arc::new(settings))
        }
    }
}

/// Builds the keymap service for `config`.
///
/// Layers are sized to the selected physical layout.  Without any configured
/// layout, every layer takes the length of the longest configured layer.
pub fn assemble_service(
    config: &DeviceConfig,
    settings: Arc<dyn SettingsStore>,
    boot: &LocalIdBoot,
    notifications: Arc<dyn NotificationSink>,
) -> DeviceService {
    let registry = Arc::new(build_registry(&config.behaviors));
    let local_ids = boot.initialize(&registry, settings.as_ref());

    let layouts = SettingsPhysicalLayouts::load(
        PhysicalLayoutSet::new(
            config.physical_layouts.clone(),
            config.position_maps.clone(),
        ),
        Arc::clone(&settings),
    );
    let key_count = if config.physical_layouts.is_empty() {
        config
            .keymap
            .layers
            .iter()
            .map(|layer| layer.bindings.len())
            .max()
            .unwrap_or(0)
    } else {
        layouts.selected_key_count()
    };

    let keymap = SettingsKeymap::load(&config.keymap.layers, key_count, &registry, settings);

    info!(
        behaviors = registry.len(),
        layers = config.keymap.layers.len(),
        layouts = config.physical_layouts.len(),
        key_count,
        "device assembled"
    );
    KeymapRpcService::new(registry, local_ids, keymap, layouts, notifications)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::keymap_rpc::{KeymapStore, PhysicalLayoutStore};
    use crate::infrastructure::storage::config::parse_config;
    use keymap_core::protocol::Notification;

    struct Silent;

    impl NotificationSink for Silent {
        fn raise(&self, _notification: Notification) {}
    }

    #[test]
    fn test_layers_follow_longest_configured_layer_without_layouts() {
        // Arrange
        let config = parse_config(
            r#"
[[keymap.layers]]
bindings = [{}, {}, {}]
[[keymap.layers]]
bindings = [{}]
"#,
        )
        .unwrap();

        // Act
        let service = assemble_service(
            &config,
            Arc::new(MemorySettings::new()),
            &LocalIdBoot::new(),
            Arc::new(Silent),
        );

        // Assert
        assert_eq!(service.keymap().layer_len(0), 3);
        assert_eq!(service.keymap().layer_len(1), 3);
        assert!(service.layouts().layouts().is_empty());
    }

    #[test]
    fn test_memory_backend_opens_without_a_path() {
        let device = DeviceSection {
            settings_backend: SettingsBackend::Memory,
            ..Default::default()
        };
        let settings = open_settings(&device).unwrap();
        assert!(settings.load_subtree("").unwrap().is_empty());
    }
}
