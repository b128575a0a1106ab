//! Keymap cell bindings and the binding validator.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::domain::behavior::{BehaviorRegistry, MetadataError};
use crate::domain::parameters::{validate_params, ParameterError, ValidationLimits};

/// One keymap cell: a behavior reference plus two parameters.
///
/// `behavior` is `None` for an empty cell.  Names handed out by the
/// [`BehaviorRegistry`] should be cloned into bindings so that later lookups
/// hit the registry's pointer fast path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BehaviorBinding {
    pub behavior: Option<Arc<str>>,
    pub param1: u32,
    pub param2: u32,
}

impl BehaviorBinding {
    pub fn new(behavior: Arc<str>, param1: u32, param2: u32) -> Self {
        Self {
            behavior: Some(behavior),
            param1,
            param2,
        }
    }

    /// The zero binding used for cells with no correspondence.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.behavior.is_none()
    }

    pub fn behavior_name(&self) -> Option<&str> {
        self.behavior.as_deref()
    }
}

/// Why a binding was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum BindingError {
    /// No ready behavior is registered under this name.
    #[error("behavior not found: {0:?}")]
    NotFound(String),

    /// The behavior failed to report its parameter metadata.
    #[error("parameter metadata unavailable for {behavior}")]
    MetadataUnavailable {
        behavior: String,
        #[source]
        source: MetadataError,
    },

    /// The parameters do not satisfy the behavior's metadata.
    #[error(transparent)]
    Invalid(#[from] ParameterError),
}

/// Resolves a binding's behavior and checks its parameters.
#[derive(Debug, Clone, Copy)]
pub struct BindingValidator<'a> {
    registry: &'a BehaviorRegistry,
    limits: ValidationLimits,
}

impl<'a> BindingValidator<'a> {
    pub fn new(registry: &'a BehaviorRegistry, limits: ValidationLimits) -> Self {
        Self { registry, limits }
    }

    /// Validates `binding` against its behavior's declared metadata.
    ///
    /// # Errors
    ///
    /// - [`BindingError::NotFound`] when the behavior is unknown, not ready or
    ///   the cell is empty.
    /// - [`BindingError::MetadataUnavailable`] when the metadata query fails.
    /// - [`BindingError::Invalid`] when no parameter set accepts the params.
    pub fn validate(&self, binding: &BehaviorBinding) -> Result<(), BindingError> {
        let name = binding.behavior_name().unwrap_or_default();
        let behavior = self
            .registry
            .lookup_by_name(name)
            .ok_or_else(|| BindingError::NotFound(name.to_string()))?;

        let metadata =
            behavior
                .parameter_metadata()
                .map_err(|source| BindingError::MetadataUnavailable {
                    behavior: name.to_string(),
                    source,
                })?;

        debug!(
            behavior = name,
            sets = metadata.sets.len(),
            "validating binding parameters"
        );
        validate_params(Some(&metadata), binding.param1, binding.param2, &self.limits)?;
        Ok(())
    }
}
