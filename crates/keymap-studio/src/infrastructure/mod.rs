//! Infrastructure layer for the keymap studio service.
//!
//! Contains the outward-facing adapters: configuration and settings files,
//! the settings-backed keymap and layout stores, configured behaviors, and
//! the TCP RPC server.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `keymap_core`, but MUST NOT be imported by the `application` or domain
//! layers.

pub mod behaviors;
pub mod device;
pub mod network;
pub mod storage;
