//! Layered configuration for the sync subsystem.
//!
//! Sources, lowest to highest precedence:
//! - Default values
//! - `.sidecar/sync.toml`, found by searching upward from the working directory
//! - Environment variables
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `SIDECAR_` and use double
//! underscores to separate nested levels:
//! - `SIDECAR_WATCH__DEBOUNCE_MS=250` sets `watch.debounce_ms`
//! - `SIDECAR_SESSIONS__CAPACITY=64` sets `sessions.capacity`
//! - `SIDECAR_TREE__RESPECT_GITIGNORE=false` sets `tree.respect_gitignore`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory holding the config file, relative to a workspace root.
pub const CONFIG_DIR: &str = ".sidecar";
/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "sync.toml";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Event bus settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// File tree settings
    #[serde(default)]
    pub tree: TreeConfig,

    /// Session classifier settings
    #[serde(default)]
    pub sessions: SessionConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Quiet period before a burst is delivered
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Outbound queue size for the tree bus
    #[serde(default = "default_tree_capacity")]
    pub capacity: usize,

    /// Also watch directories that exist below the root at startup
    #[serde(default = "default_false")]
    pub watch_subdirs: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TreeConfig {
    /// Extra gitignore-style patterns flagged as ignored
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Also apply the root `.gitignore`
    #[serde(default = "default_true")]
    pub respect_gitignore: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Directory of `session-*.json` files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Outbound queue size for session events
    #[serde(default = "default_session_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Level for everything without a module override
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `sidecar_sync::watcher = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_debounce_ms() -> u64 {
    100
}
fn default_tree_capacity() -> usize {
    1
}
fn default_session_capacity() -> usize {
    32
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            capacity: default_tree_capacity(),
            watch_subdirs: false,
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![".git/".to_string()],
            respect_gitignore: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            capacity: default_session_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources, searching upward from the
    /// current directory for the config file.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let start = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::load_in(&start)
    }

    /// Like [`load`](Self::load), searching upward from `start`.
    pub fn load_in(start: &Path) -> Result<Self, Box<figment::Error>> {
        let config_path =
            Self::find_config(start).unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file. A missing file is not an
    /// error; defaults and the environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("SIDECAR_").map(|key| {
                key.as_str()
                    .to_lowercase()
                    .replace("__", ".")
                    .into()
            }))
    }

    /// Find `.sidecar/sync.toml` in `start` or one of its ancestors.
    pub fn find_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join(CONFIG_FILE))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
