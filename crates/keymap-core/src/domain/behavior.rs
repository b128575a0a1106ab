//! Behaviors and the boot-time behavior registry.
//!
//! A *behavior* is a named, pluggable input handler (key press, layer toggle,
//! mod-tap, ...) that can be bound to a key position.  This crate does not
//! implement any behavior: it only sees each one through the
//! [`BehaviorDriver`] capability trait, which answers two questions:
//!
//! - Is the behavior ready to be used?
//! - Which parameters does it accept? (see [`crate::domain::parameters`])
//!
//! # Registry lifecycle
//!
//! The [`BehaviorRegistry`] is assembled once at boot from a static list of
//! descriptors and never changes afterwards.  There is no runtime
//! registration API.  Names are expected to be unique; duplicates are logged
//! when the registry is built but do not stop the firmware from booting.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use crate::domain::parameters::ParameterMetadata;

/// Failure of a behavior's parameter metadata query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// The behavior could not produce its metadata.
    #[error("parameter metadata query failed: {0}")]
    QueryFailed(String),
}

/// Capability interface of a concrete behavior implementation.
#[cfg_attr(test, mockall::automock)]
pub trait BehaviorDriver: Send + Sync {
    /// Returns `false` while the behavior has not finished initialising.
    fn is_ready(&self) -> bool {
        true
    }

    /// Describes the parameter combinations this behavior accepts.
    ///
    /// Behaviors that do not negotiate metadata report zero sets, which only
    /// accepts bindings whose parameters are both `0`.
    fn parameter_metadata(&self) -> Result<ParameterMetadata, MetadataError> {
        Ok(ParameterMetadata::empty())
    }
}

/// A registered behavior: its unique name plus its driver.
#[derive(Clone)]
pub struct Behavior {
    name: Arc<str>,
    driver: Arc<dyn BehaviorDriver>,
}

impl Behavior {
    pub fn new(name: impl Into<Arc<str>>, driver: Arc<dyn BehaviorDriver>) -> Self {
        Self {
            name: name.into(),
            driver,
        }
    }

    /// The registered name.  Cloning the returned `Arc` keeps the same
    /// allocation, which lets [`BehaviorRegistry::lookup_by_name`] take its
    /// pointer fast path.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.driver.is_ready()
    }

    /// Queries the driver for its parameter metadata.
    ///
    /// # Errors
    ///
    /// Propagates the driver's [`MetadataError`].
    pub fn parameter_metadata(&self) -> Result<ParameterMetadata, MetadataError> {
        self.driver.parameter_metadata()
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("name", &self.name)
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Immutable list of every behavior compiled into the firmware.
#[derive(Debug, Default)]
pub struct BehaviorRegistry {
    behaviors: Vec<Behavior>,
}

impl BehaviorRegistry {
    /// Builds the registry and logs every duplicated name.
    pub fn new(behaviors: Vec<Behavior>) -> Self {
        let registry = Self { behaviors };
        for name in registry.duplicate_names() {
            error!(name, "multiple behaviors have the same name");
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Iterates behaviors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Behavior> {
        self.behaviors.iter()
    }

    /// Finds a ready behavior by name.
    ///
    /// The first pass only compares string addresses, which succeeds when the
    /// caller hands back a name obtained from this registry.  The second pass
    /// compares contents.  Empty names never match.
    pub fn lookup_by_name(&self, name: &str) -> Option<&Behavior> {
        if name.is_empty() {
            return None;
        }

        self.behaviors
            .iter()
            .find(|b| b.is_ready() && std::ptr::eq(b.name.as_ref(), name))
            .or_else(|| {
                self.behaviors
                    .iter()
                    .find(|b| b.is_ready() && b.name.as_ref() == name)
            })
    }

    /// Returns one entry per colliding pair of registered names.
    pub fn duplicate_names(&self) -> Vec<&str> {
        let mut duplicates = Vec::new();
        for (i, current) in self.behaviors.iter().enumerate() {
            for other in &self.behaviors[i + 1..] {
                if current.name == other.name {
                    duplicates.push(current.name.as_ref());
                }
            }
        }
        duplicates
    }
}

/// Driver for behaviors that only exist to be referenced, e.g. in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticBehavior;

impl BehaviorDriver for StaticBehavior {}
