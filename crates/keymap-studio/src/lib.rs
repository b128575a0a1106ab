//! keymap-studio library: the remote keymap editing service.
//!
//! The binary in `main.rs` wires these modules together; they are exposed as
//! a library so integration tests can drive the service end to end.

pub mod application;
pub mod infrastructure;
