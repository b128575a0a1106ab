//! Network infrastructure.
//!
//! # Sub-modules
//!
//! - **`rpc_server`** – Accepts TCP connections from configuration tools,
//!   frames keymap RPC requests and responses, and pushes
//!   `unsaved_changes_status_changed` notifications to every client.

pub mod rpc_server;
