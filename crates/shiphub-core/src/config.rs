//! Application configuration management.
//!
//! This module handles loading and saving the preferences the credential
//! store needs across restarts, most importantly the last used login.
//!
//! Configuration is stored at `~/.config/shiphub/config.json`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Application name used for config directory paths
const APP_NAME: &str = "shiphub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Login of the most recently created or loaded session.
    pub last_used_login: Option<String>,
    /// Overrides the keychain service name credentials are filed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keychain_service: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

/// Process-wide handle on the persisted [`Config`].
///
/// Starts empty on first run. A file-backed store writes through on every
/// update; an in-memory store forgets everything when dropped.
pub struct ConfigStore {
    path: Option<PathBuf>,
    config: Mutex<Config>,
}

impl ConfigStore {
    /// Open the config file at the default location.
    pub fn open() -> Result<Self> {
        Self::open_at(Config::config_path()?)
    }

    pub fn open_at(path: PathBuf) -> Result<Self> {
        let config = Config::load_from(&path)?;
        debug!(path = %path.display(), last_used = ?config.last_used_login, "Config loaded");
        Ok(Self {
            path: Some(path),
            config: Mutex::new(config),
        })
    }

    pub fn in_memory(config: Config) -> Self {
        Self {
            path: None,
            config: Mutex::new(config),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot of the current configuration.
    pub fn get(&self) -> Config {
        self.lock().clone()
    }

    /// Apply `f` and persist the result if anything changed.
    pub fn update(&self, f: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = self.lock();
        let before = config.clone();
        f(&mut config);
        if *config == before {
            return Ok(());
        }
        match self.path {
            Some(ref path) => config.save_to(path),
            None => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Config> {
        // Config holds plain data; a panic mid-update cannot leave it torn.
        self.config.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
