//! Storage infrastructure: configuration and persistent settings.
//!
//! - `config` reads the TOML device description.
//! - `settings_file` is the on-disk key-value store.
//! - `keymap_store` and `layout_store` keep the editable keymap and layout
//!   selection, persisting them through any settings store.

pub mod config;
pub mod keymap_store;
pub mod layout_store;
pub mod settings_file;
