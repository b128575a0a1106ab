//! Domain entities for remote keymap editing.
//!
//! Nothing in here touches sockets, files or an async runtime.  Storage is
//! reached only through the [`settings::SettingsStore`] contract and behaviors
//! only through the [`behavior::BehaviorDriver`] capability trait, so every
//! rule can be unit-tested in isolation.

/// Behavior registry and the behavior capability trait.
pub mod behavior;

/// Keymap cell bindings and the binding validator.
pub mod binding;

/// Physical layouts, key geometry and position maps.
pub mod layout;

/// Stable behavior identifiers.
pub mod local_id;

/// Parameter metadata and the constraint validator.
pub mod parameters;

/// Key-value settings store contract.
pub mod settings;
