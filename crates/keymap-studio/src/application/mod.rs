//! Application layer: use cases for the keymap studio service.
//!
//! # What is an "application layer"?
//!
//! In a layered architecture the *application layer* sits between the domain
//! (pure rules in `keymap-core`) and the infrastructure (files, sockets,
//! config).  It coordinates *what happens* when a request arrives without
//! knowing *how* the keymap is stored or *how* bytes reach the client.
//!
//! # Use cases in this module
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`keymap_rpc`] | Answer keymap RPC requests and raise unsaved-changes notifications |
//! | [`migrate_layout`] | Move every layer's bindings to a new physical layout |
//! | [`startup`] | Build the behavior local-id table exactly once at boot |
//!
//! # Dependency direction
//!
//! ```text
//! infrastructure ──uses──► application ──uses──► keymap-core (domain)
//! ```
//!
//! Storage and transport are reached only through the traits defined in
//! [`keymap_rpc`], so every use case can be tested with in-memory doubles.

pub mod keymap_rpc;
pub mod migrate_layout;
pub mod startup;
