//! Behavior parameter metadata and the constraint validator.
//!
//! A behavior declares which `(param1, param2)` combinations it accepts as a
//! list of *sets*.  Each set lists the acceptable values for `param1` and for
//! `param2` as [`ParameterValueSpec`]s.
//!
//! ```text
//! metadata = [ set0, set1, ... ]          OR across sets
//! set      = { param1: [spec, spec, ...], AND across the two parameters
//!              param2: [spec, spec, ...] } OR across the specs of one list
//! ```
//!
//! A parameter whose spec list is empty accepts only the value `0`.  This is
//! how a behavior says "I take one parameter" (empty `param2`) or "I take
//! none" (no sets at all).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::keymap::hid::{HidUsage, UsageLimits};

/// One acceptable shape for a single parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterValueSpec {
    /// Matches only the value `0`.
    Nil,
    /// The value is a packed HID usage that the firmware can report.
    HidUsage,
    /// The value is the index of an existing keymap layer.
    LayerIndex,
    /// The value must equal `value` exactly.
    FixedValue { value: u32 },
    /// The value must lie in `min..=max`.
    Range { min: u32, max: u32 },
}

/// The acceptable values for both parameters in one combination.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMetadataSet {
    #[serde(default)]
    pub param1: Vec<ParameterValueSpec>,
    #[serde(default)]
    pub param2: Vec<ParameterValueSpec>,
}

/// All parameter combinations a behavior accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterMetadata {
    #[serde(default)]
    pub sets: Vec<ParameterMetadataSet>,
}

impl ParameterMetadata {
    pub fn new(sets: Vec<ParameterMetadataSet>) -> Self {
        Self { sets }
    }

    /// Metadata of a behavior that takes no parameters.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Outcome of checking a single value against a spec list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMatch {
    /// At least one spec accepted the value.
    Match,
    /// Specs were declared and none of them accepted the value.
    Unsupported,
    /// The spec list was empty.
    NoSpecsDeclared,
}

/// Context the validator needs beyond the metadata itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    /// Number of layers in the keymap; valid layer indices are `0..layer_count`.
    pub layer_count: usize,
    /// Per-page HID usage ceilings.
    pub usage: UsageLimits,
}

impl ValidationLimits {
    pub fn new(layer_count: usize, usage: UsageLimits) -> Self {
        Self { layer_count, usage }
    }
}

/// Errors returned by [`validate_params`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ParameterError {
    /// The behavior declares no parameter sets and a parameter was non-zero.
    #[error("behavior takes no parameters but got param1={param1}, param2={param2}")]
    UnexpectedParameters { param1: u32, param2: u32 },

    /// No declared set accepts the parameter pair.
    #[error("no parameter set accepts param1={param1}, param2={param2}")]
    NoMatchingSet { param1: u32, param2: u32 },
}

/// Checks `value` against `specs`, first match wins.
pub fn validate_value(
    specs: &[ParameterValueSpec],
    value: u32,
    limits: &ValidationLimits,
) -> ValueMatch {
    if specs.is_empty() {
        return ValueMatch::NoSpecsDeclared;
    }

    let matched = specs.iter().any(|spec| spec_matches(spec, value, limits));
    if matched {
        ValueMatch::Match
    } else {
        ValueMatch::Unsupported
    }
}

fn spec_matches(spec: &ParameterValueSpec, value: u32, limits: &ValidationLimits) -> bool {
    match *spec {
        ParameterValueSpec::Nil => value == 0,
        ParameterValueSpec::HidUsage => limits.usage.validate(HidUsage::from_param(value)).is_ok(),
        ParameterValueSpec::LayerIndex => (value as usize) < limits.layer_count,
        ParameterValueSpec::FixedValue { value: expected } => value == expected,
        ParameterValueSpec::Range { min, max } => (min..=max).contains(&value),
    }
}

/// A parameter passes when it matched, or when nothing was declared and it is 0.
fn param_passes(result: ValueMatch, value: u32) -> bool {
    match result {
        ValueMatch::Match => true,
        ValueMatch::NoSpecsDeclared => value == 0,
        ValueMatch::Unsupported => false,
    }
}

/// Checks a parameter pair against a behavior's declared metadata.
///
/// Absent metadata, or metadata with no sets, accepts only `(0, 0)`.
///
/// # Errors
///
/// Returns [`ParameterError::UnexpectedParameters`] when the behavior takes no
/// parameters and either value is non-zero, and
/// [`ParameterError::NoMatchingSet`] when no set accepts both values.
pub fn validate_params(
    metadata: Option<&ParameterMetadata>,
    param1: u32,
    param2: u32,
    limits: &ValidationLimits,
) -> Result<(), ParameterError> {
    let sets = match metadata {
        Some(metadata) if !metadata.sets.is_empty() => &metadata.sets,
        other => {
            if other.is_none() {
                error!("no metadata to check parameters against");
            }
            return if param1 == 0 && param2 == 0 {
                Ok(())
            } else {
                Err(ParameterError::UnexpectedParameters { param1, param2 })
            };
        }
    };

    for (index, set) in sets.iter().enumerate() {
        let param1_ok = param_passes(validate_value(&set.param1, param1, limits), param1);
        let param2_ok = param_passes(validate_value(&set.param2, param2, limits), param2);

        if param1_ok && param2_ok {
            debug!(set = index, param1, param2, "parameters accepted");
            return Ok(());
        }
    }

    Err(ParameterError::NoMatchingSet { param1, param2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::hid::{HID_USAGE_CONSUMER, HID_USAGE_KEY};

    fn limits() -> ValidationLimits {
        ValidationLimits::new(4, UsageLimits::BASIC)
    }

    fn key_usage(id: u32) -> u32 {
        (u32::from(HID_USAGE_KEY) << 16) | id
    }

    // ── validate_value ────────────────────────────────────────────────────────

    #[test]
    fn test_empty_specs_report_no_specs_declared_for_any_value() {
        for value in [0, 1, 42, u32::MAX] {
            assert_eq!(
                validate_value(&[], value, &limits()),
                ValueMatch::NoSpecsDeclared
            );
        }
    }

    #[test]
    fn test_nil_matches_only_zero() {
        let specs = [ParameterValueSpec::Nil];
        assert_eq!(validate_value(&specs, 0, &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, 1, &limits()), ValueMatch::Unsupported);
    }

    #[test]
    fn test_layer_index_is_bounded_by_layer_count() {
        let specs = [ParameterValueSpec::LayerIndex];
        assert_eq!(validate_value(&specs, 0, &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, 3, &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, 4, &limits()), ValueMatch::Unsupported);
    }

    #[test]
    fn test_fixed_value_and_range() {
        let specs = [
            ParameterValueSpec::FixedValue { value: 100 },
            ParameterValueSpec::Range { min: 10, max: 20 },
        ];
        assert_eq!(validate_value(&specs, 100, &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, 10, &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, 20, &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, 21, &limits()), ValueMatch::Unsupported);
        assert_eq!(validate_value(&specs, 9, &limits()), ValueMatch::Unsupported);
    }

    #[test]
    fn test_hid_usage_spec_delegates_to_usage_limits() {
        let specs = [ParameterValueSpec::HidUsage];
        let consumer_ff = (u32::from(HID_USAGE_CONSUMER) << 16) | 0xFF;
        let consumer_100 = (u32::from(HID_USAGE_CONSUMER) << 16) | 0x100;

        assert_eq!(validate_value(&specs, key_usage(0x04), &limits()), ValueMatch::Match);
        assert_eq!(validate_value(&specs, key_usage(0), &limits()), ValueMatch::Unsupported);
        assert_eq!(validate_value(&specs, consumer_ff, &limits()), ValueMatch::Match);
        assert_eq!(
            validate_value(&specs, consumer_100, &limits()),
            ValueMatch::Unsupported
        );
    }

    // ── validate_params ───────────────────────────────────────────────────────

    #[test]
    fn test_absent_metadata_accepts_only_zero_params() {
        assert!(validate_params(None, 0, 0, &limits()).is_ok());
        assert_eq!(
            validate_params(None, 5, 0, &limits()),
            Err(ParameterError::UnexpectedParameters { param1: 5, param2: 0 })
        );
        assert!(validate_params(None, 0, 1, &limits()).is_err());
    }

    #[test]
    fn test_metadata_without_sets_behaves_like_absent_metadata() {
        let metadata = ParameterMetadata::empty();
        assert!(validate_params(Some(&metadata), 0, 0, &limits()).is_ok());
        assert!(validate_params(Some(&metadata), 0, 7, &limits()).is_err());
    }

    #[test]
    fn test_single_param_behavior_requires_param2_zero() {
        // Arrange: key press style metadata (param2 undeclared)
        let metadata = ParameterMetadata::new(vec![ParameterMetadataSet {
            param1: vec![ParameterValueSpec::HidUsage],
            param2: vec![],
        }]);

        // Act / Assert
        assert!(validate_params(Some(&metadata), key_usage(0x04), 0, &limits()).is_ok());
        assert_eq!(
            validate_params(Some(&metadata), key_usage(0x04), 1, &limits()),
            Err(ParameterError::NoMatchingSet {
                param1: key_usage(0x04),
                param2: 1
            })
        );
    }

    #[test]
    fn test_sets_are_ored_and_params_within_a_set_are_anded() {
        // Arrange: mod-tap style behavior with two alternative shapes
        let metadata = ParameterMetadata::new(vec![
            ParameterMetadataSet {
                param1: vec![ParameterValueSpec::LayerIndex],
                param2: vec![ParameterValueSpec::HidUsage],
            },
            ParameterMetadataSet {
                param1: vec![ParameterValueSpec::FixedValue { value: 99 }],
                param2: vec![ParameterValueSpec::Nil],
            },
        ]);

        // Act / Assert
        assert!(validate_params(Some(&metadata), 1, key_usage(0x05), &limits()).is_ok());
        assert!(validate_params(Some(&metadata), 99, 0, &limits()).is_ok());
        // param1 matches set 0, param2 only matches set 1: no single set accepts both
        assert!(validate_params(Some(&metadata), 1, 0, &limits()).is_err());
        assert!(validate_params(Some(&metadata), 99, key_usage(0x05), &limits()).is_err());
    }
}
