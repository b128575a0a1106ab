//! TOML-based device configuration.
//!
//! Describes everything the firmware image would normally bake in: the
//! behaviors it ships, its physical layouts and how their key positions
//! correspond, and the default keymap.  The file is read once at start-up from
//! `--config`, or from the platform-appropriate location:
//! - Windows:  `%APPDATA%\KeymapStudio\config.toml`
//! - Linux:    `~/.config/keymap-studio/config.toml`
//! - macOS:    `~/Library/Application Support/KeymapStudio/config.toml`
//!
//! # Example
//!
//! ```toml
//! [device]
//! listen_address = "127.0.0.1:24900"
//! settings_backend = "file"
//!
//! [[behaviors]]
//! name = "key_press"
//! [[behaviors.metadata]]
//! param1 = [{ type = "hid_usage" }]
//!
//! [[behaviors]]
//! name = "transparent"
//!
//! [[physical_layouts]]
//! id = "ansi"
//! display_name = "ANSI"
//! keys = [{ width = 100, height = 100, x = 0, y = 0 }]
//!
//! [[keymap.layers]]
//! name = "Base"
//! bindings = [{ behavior = "key_press", param1 = 0x70004 }]
//! ```
//!
//! # Serde default values
//!
//! Every section is optional.  Fields annotated with
//! `#[serde(default = "some_fn")]` take the value of `some_fn()` when absent,
//! so an empty file yields a device with no behaviors and no layouts.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use keymap_core::{ParameterMetadataSet, PhysicalLayout, PositionMapGroup};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub behaviors: Vec<BehaviorEntry>,
    #[serde(default)]
    pub physical_layouts: Vec<PhysicalLayout>,
    #[serde(default)]
    pub position_maps: Vec<PositionMapGroup>,
    #[serde(default)]
    pub keymap: KeymapConfig,
}

/// Process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Address the RPC listener binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,
    /// Where persistent settings live.
    #[serde(default)]
    pub settings_backend: SettingsBackend,
    /// Settings file; defaults to `settings.bin` in the config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

/// Persistent settings backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettingsBackend {
    /// Bincode file on disk.
    #[default]
    File,
    /// Nothing survives a restart.
    Memory,
}

/// A behavior the device ships.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorEntry {
    pub name: String,
    /// Accepted parameter sets.  Absent means the behavior does not describe
    /// its parameters and only `(0, 0)` is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<ParameterMetadataSet>>,
}

/// Default keymap, used until a layer is saved over it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KeymapConfig {
    #[serde(default)]
    pub layers: Vec<LayerEntry>,
}

/// One keymap layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LayerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub bindings: Vec<BindingEntry>,
}

/// One keymap cell; no `behavior` means the cell is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<String>,
    #[serde(default)]
    pub param1: u32,
    #[serde(default)]
    pub param2: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 24900))
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            listen_address: default_listen_address(),
            settings_backend: SettingsBackend::default(),
            settings_path: None,
        }
    }
}

impl DeviceSection {
    /// The settings file to use, falling back to the config directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoPlatformConfigDir`] when no path is configured
    /// and the platform directory is unknown.
    pub fn resolved_settings_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.settings_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("settings.bin")),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the configuration from `path`, or from [`config_file_path`] when
/// `path` is `None`.  A missing file yields `DeviceConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<DeviceConfig, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeviceConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Parses configuration text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<DeviceConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Resolves the platform config directory including the application subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("KeymapStudio"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("keymap-studio"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("KeymapStudio")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
