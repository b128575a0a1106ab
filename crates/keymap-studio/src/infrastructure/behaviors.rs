//! Behaviors declared in the device configuration.
//!
//! A [`DeclaredBehavior`] carries nothing but the parameter metadata its
//! configuration entry declares; it is always ready.

use std::sync::Arc;

use keymap_core::{Behavior, BehaviorDriver, BehaviorRegistry, MetadataError, ParameterMetadata};
use tracing::debug;

use crate::infrastructure::storage::config::BehaviorEntry;

/// [`BehaviorDriver`] backed by configuration.
#[derive(Debug, Clone, Default)]
pub struct DeclaredBehavior {
    metadata: ParameterMetadata,
}

impl DeclaredBehavior {
    pub fn new(metadata: ParameterMetadata) -> Self {
        Self { metadata }
    }
}

impl BehaviorDriver for DeclaredBehavior {
    fn parameter_metadata(&self) -> Result<ParameterMetadata, MetadataError> {
        Ok(self.metadata.clone())
    }
}

/// Builds the registry from configuration entries, in order.
pub fn build_registry(entries: &[BehaviorEntry]) -> BehaviorRegistry {
    let behaviors = entries
        .iter()
        .map(|entry| {
            let metadata = entry
                .metadata
                .clone()
                .map_or_else(ParameterMetadata::empty, ParameterMetadata::new);
            debug!(behavior = %entry.name, sets = metadata.sets.len(), "declaring behavior");
            Behavior::new(entry.name.as_str(), Arc::new(DeclaredBehavior::new(metadata)))
        })
        .collect();
    BehaviorRegistry::new(behaviors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymap_core::{ParameterMetadataSet, ParameterValueSpec};

    #[test]
    fn test_registry_keeps_configuration_order_and_metadata() {
        // Arrange
        let entries = vec![
            BehaviorEntry {
                name: "key_press".to_string(),
                metadata: Some(vec![ParameterMetadataSet {
                    param1: vec![ParameterValueSpec::HidUsage],
                    param2: vec![],
                }]),
            },
            BehaviorEntry {
                name: "transparent".to_string(),
                metadata: None,
            },
        ];

        // Act
        let registry = build_registry(&entries);

        // Assert
        let names: Vec<_> = registry.iter().map(|b| b.name().to_string()).collect();
        assert_eq!(names, vec!["key_press", "transparent"]);
        let key_press = registry.lookup_by_name("key_press").unwrap();
        assert_eq!(key_press.parameter_metadata().unwrap().sets.len(), 1);
        let transparent = registry.lookup_by_name("transparent").unwrap();
        assert!(transparent.parameter_metadata().unwrap().sets.is_empty());
        assert!(transparent.is_ready());
    }
}
