// SPDX-License-Identifier: GPL-3.0-only

//! Persistent settings
//!
//! Stored as pretty JSON under the user's config directory. A missing or
//! unreadable file never stops the session: defaults are used instead.

use crate::backends::camera::Resolution;
use crate::constants::app_info::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Last preview size the user picked
    pub preferred_resolution: Option<Resolution>,
    /// Open a capture device as soon as it is plugged in
    pub auto_open: bool,
    /// Play captured audio back while previewing
    pub audio_loopback: bool,
    /// Show the overlay camera
    pub pip_enabled: bool,
    /// Device node of the overlay camera (e.g. "/dev/video0")
    pub pip_device: Option<String>,
    /// Default log filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_resolution: None,
            auto_open: true,
            audio_loopback: true,
            pip_enabled: false,
            pip_device: None,
            log_filter: "warn".to_string(),
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            warn!("No config directory available, using defaults");
            return Self::default();
        };
        if !path.exists() {
            debug!(path = %path.display(), "No config file yet, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> AppResult<()> {
        let path = Self::path().ok_or_else(|| AppError::Config("no config directory".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.auto_open);
        assert!(config.audio_loopback);
        assert!(!config.pip_enabled);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"pip_enabled": true}"#).unwrap();
        assert!(config.pip_enabled);
        assert!(config.auto_open);
        assert_eq!(config.preferred_resolution, None);
    }
}
