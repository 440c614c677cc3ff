//! Configuration system for codecoach.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/codecoach/config.toml` and/or `.codecoach/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Name of the per-workspace state directory.
pub const WORKSPACE_DIR: &str = ".codecoach";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoachConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub hints: HintConfig,
}

/// Where experiment records are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Json,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Database file (sqlite) or directory (json). Defaults to a location
    /// inside the workspace state directory.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the storage location for a workspace.
    pub fn resolve_path(&self, workspace: &Path) -> PathBuf {
        if let Some(path) = &self.path {
            if path.is_absolute() {
                return path.clone();
            }
            return workspace.join(path);
        }
        let base = workspace.join(WORKSPACE_DIR);
        match self.backend {
            StoreBackend::Sqlite | StoreBackend::Memory => base.join("experiments.db"),
            StoreBackend::Json => base.join("experiments"),
        }
    }
}

/// Hint display behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HintConfig {
    /// Auto-dismiss displayed hints after this many milliseconds. `None`
    /// keeps them until dismissed.
    pub auto_dismiss_ms: Option<u64>,
    /// Surface triggered hints when a run completes.
    pub show_on_run_complete: bool,
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_ms: Some(15_000),
            show_on_run_complete: true,
        }
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "codecoach", "codecoach")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `CODECOACH_`)
/// 3. Workspace-local config (`.codecoach/config.toml`)
/// 4. User config (`~/.config/codecoach/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&CoachConfig>,
) -> Result<CoachConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(CoachConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_DIR).join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // CODECOACH_STORE__BACKEND, CODECOACH_HINTS__AUTO_DISMISS_MS, ...
    figment = figment.merge(Env::prefixed("CODECOACH_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Check whether any codecoach configuration file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| ws.join(WORKSPACE_DIR).join("config.toml").exists())
}

/// Write `config` as the workspace config file, returning its path.
pub fn save_workspace_config(workspace: &Path, config: &CoachConfig) -> crate::Result<PathBuf> {
    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Invalid {
        message: e.to_string(),
    })?;
    let path = workspace.join(WORKSPACE_DIR).join("config.toml");
    crate::persistence::atomic_write(&path, content.as_bytes())?;
    Ok(path)
}
