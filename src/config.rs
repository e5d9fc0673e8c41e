//! Configuration loading and management
//!
//! Handles parsing of `.monodev.toml` at the repo root (tracked) and
//! resolution of the user-global data root where global stores and
//! state files live.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::OverlayMode;

/// Name of the repo config file.
pub const CONFIG_FILE: &str = ".monodev.toml";

/// Name of the per-repo component directory.
pub const COMPONENT_DIR: &str = ".monodev";

/// Environment variable overriding the user-global root.
pub const HOME_ENV: &str = "MONODEV_HOME";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Overlay configuration
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Diff configuration
    #[serde(default)]
    pub diff: DiffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            overlay: OverlayConfig::default(),
            diff: DiffConfig::default(),
        }
    }
}

/// Overlay-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Default overlay mode for `apply` when none is given
    #[serde(default = "default_mode")]
    pub mode: OverlayMode,
}

fn default_mode() -> OverlayMode {
    OverlayMode::Symlink
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
        }
    }
}

/// Diff-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Context lines in unified patches
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Skip patch generation for files larger than this (bytes)
    #[serde(default = "default_max_patch_bytes")]
    pub max_patch_bytes: u64,
}

fn default_context_lines() -> usize {
    3
}

fn default_max_patch_bytes() -> u64 {
    1024 * 1024
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            max_patch_bytes: default_max_patch_bytes(),
        }
    }
}

impl Config {
    /// Load configuration from a `.monodev.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from repo root, or return defaults
    pub fn load_from_repo(repo_root: &Path) -> Self {
        let config_path = repo_root.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|err| Error::io(path, err))?;
        Ok(())
    }
}

/// Filesystem roots the engine operates over.
#[derive(Debug, Clone)]
pub struct Roots {
    /// User-global root: global stores, workspace state, repo state.
    pub global_root: PathBuf,
    /// Repository root (workdir).
    pub repo_root: PathBuf,
}

impl Roots {
    pub fn new(global_root: PathBuf, repo_root: PathBuf) -> Self {
        Self {
            global_root,
            repo_root,
        }
    }

    pub fn global_stores_dir(&self) -> PathBuf {
        self.global_root.join("stores")
    }

    pub fn component_stores_dir(&self) -> PathBuf {
        self.repo_root.join(COMPONENT_DIR).join("stores")
    }
}

/// Resolve the user-global root: `MONODEV_HOME` when set, otherwise
/// the platform data directory.
pub fn resolve_global_root() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    let dirs = directories::ProjectDirs::from("", "", "monodev").ok_or_else(|| {
        Error::OperationFailed("could not determine a home directory".to_string())
    })?;
    Ok(dirs.data_dir().to_path_buf())
}
