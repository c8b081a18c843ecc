//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API host, which credential backend to use, the last email used to
//! log in and the OTP stub delay.
//!
//! Configuration is stored at `~/.config/examportal/config.json`.
//! `EXAMPORTAL_API_URL` and `EXAMPORTAL_STORAGE` override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::DEFAULT_BASE_URL;
use crate::auth::{SessionOptions, StorageKind};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "examportal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_API_URL: &str = "EXAMPORTAL_API_URL";
pub const ENV_STORAGE: &str = "EXAMPORTAL_STORAGE";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub storage: Option<StorageKind>,
    pub last_email: Option<String>,
    pub otp_delay_ms: Option<u64>,
}

impl Config {
    /// Read the config file (defaults if missing) and apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_base_url = Some(url);
        }
        if let Some(kind) = lookup(ENV_STORAGE).filter(|v| !v.is_empty()) {
            match kind.parse() {
                Ok(kind) => self.storage = Some(kind),
                Err(e) => warn!(value = %kind, error = %e, "Ignoring {}", ENV_STORAGE),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where credentials (file backend) and logs live.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn storage_kind(&self) -> StorageKind {
        self.storage.unwrap_or_default()
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::default();
        if let Some(ms) = self.otp_delay_ms {
            options.otp_delay = Duration::from_millis(ms);
        }
        options
    }
}
