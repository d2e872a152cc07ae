//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the last signed-in user, the catalogue language and the
//! catalogue endpoints.
//!
//! Configuration is stored at `~/.config/movienight/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{DEFAULT_BASE_URL, DEFAULT_IMAGE_BASE_URL};
use crate::models::DEFAULT_LANGUAGE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "movienight";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Remote document file name in the cache directory
const REMOTE_FILE: &str = "remote.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub last_user_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_catalog_base_url")]
    pub catalog_base_url: String,
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn default_catalog_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_image_base_url() -> String {
    DEFAULT_IMAGE_BASE_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            last_user_id: None,
            language: default_language(),
            catalog_base_url: default_catalog_base_url(),
            image_base_url: default_image_base_url(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Cache directory, one per signed-in user
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;

        let mut path = cache_dir.join(APP_NAME);
        if let Some(ref user) = self.last_user_id {
            path = path.join(user);
        }
        Ok(path)
    }

    /// File backing the local document store, shared by every user
    pub fn remote_store_path(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join(REMOTE_FILE))
    }
}
