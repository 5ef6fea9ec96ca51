//! Persisted settings.
//!
//! Stored as pretty JSON at `{config_dir}/crateplug/config.json`. Every field
//! has a default, so a missing or partial file is fine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::downloader::ToolManager;

pub const DEFAULT_RELAY_PORT: u16 = 48721;
pub const DEFAULT_UPDATE_URL: &str =
    "https://raw.githubusercontent.com/becksosa/crateplug/refs/heads/main/version.txt";

const APP_DIR: &str = "crateplug";
const CONFIG_FILE: &str = "config.json";
const YTDLP_ENV: &str = "CRATEPLUG_YTDLP";
const FFMPEG_ENV: &str = "CRATEPLUG_FFMPEG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Last folder downloads went to
    #[serde(default)]
    pub download_folder: Option<PathBuf>,
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default = "default_relay_bind")]
    pub relay_bind: String,
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
    #[serde(default = "default_check_updates")]
    pub check_updates: bool,
    #[serde(default = "default_update_url")]
    pub update_url: String,
}

fn default_relay_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_relay_port() -> u16 {
    DEFAULT_RELAY_PORT
}

fn default_check_updates() -> bool {
    true
}

fn default_update_url() -> String {
    DEFAULT_UPDATE_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_folder: None,
            ytdlp_path: None,
            ffmpeg_path: None,
            relay_bind: default_relay_bind(),
            relay_port: default_relay_port(),
            check_updates: default_check_updates(),
            update_url: default_update_url(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not find config directory")?;
        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut settings = Self::load_from(&Self::config_path()?)?;
        settings.apply_env(|key| std::env::var_os(key).map(PathBuf::from));
        Ok(settings)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<PathBuf>) {
        if let Some(path) = lookup(YTDLP_ENV) {
            self.ytdlp_path = Some(path);
        }
        if let Some(path) = lookup(FFMPEG_ENV) {
            self.ffmpeg_path = Some(path);
        }
    }

    /// Saved folder, else the platform download dir, else `~/Downloads`
    pub fn download_folder(&self) -> PathBuf {
        self.download_folder
            .clone()
            .or_else(dirs::download_dir)
            .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn tool_manager(&self) -> ToolManager {
        ToolManager::with_overrides(self.ytdlp_path.clone(), self.ffmpeg_path.clone())
    }
}
