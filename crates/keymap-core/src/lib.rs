//! # keymap-core
//!
//! Shared library for remote keymap editing: behavior identity, binding
//! validation, physical layouts and the keymap RPC codec.
//!
//! It has zero dependencies on sockets, files or an async runtime.  The
//! `keymap-studio` crate wires it to storage and to the network.
//!
//! # Architecture overview (for beginners)
//!
//! A keyboard firmware maps every key *position* to a *binding*: a behavior
//! ("press a key", "hold for a layer", ...) plus two numeric parameters.  A
//! remote editor changes those bindings while the keyboard is running, so the
//! firmware has to check every edit before it lands in the keymap.
//!
//! - **`domain`** – Pure rules.  The behavior registry, stable behavior ids,
//!   the parameter constraint validator, and physical layouts with the
//!   position maps used when the active layout changes.
//!
//! - **`keymap`** – USB HID usage decoding.  A binding parameter that names a
//!   key packs the usage page and id into one `u32`; the validator checks that
//!   the firmware can actually report it.
//!
//! - **`protocol`** – How requests, responses and notifications travel as
//!   bytes (12-byte header + payload).  Large response fields are generated on
//!   demand while encoding instead of being built up front.
//!
//! # Cargo features
//!
//! - `local-id-crc16`: derive behavior ids from a CRC16 of the name instead of
//!   the persisted settings table.
//! - `consumer-usages-basic` (default): Consumer page usages up to 0xFF.
//!   Without it the ceiling is 0xFFF.
//! - `nkro-extended-report`: Keyboard page usages up to 0x97 instead of 0x67.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `keymap_core::BehaviorRegistry` instead of the full module path.
pub use domain::behavior::{Behavior, BehaviorDriver, BehaviorRegistry, MetadataError};
pub use domain::binding::{BehaviorBinding, BindingError, BindingValidator};
pub use domain::layout::{
    KeyPhysicalAttrs, LayoutError, PhysicalLayout, PhysicalLayoutSet, PositionMap,
    PositionMapGroup,
};
pub use domain::local_id::{allocate_local_ids, LocalId, LocalIds};
pub use domain::parameters::{
    ParameterError, ParameterMetadata, ParameterMetadataSet, ParameterValueSpec, ValidationLimits,
};
pub use domain::settings::{MemorySettings, SettingsError, SettingsStore};
pub use keymap::hid::{HidUsage, UsageLimits};
pub use protocol::codec::ProtocolError;
