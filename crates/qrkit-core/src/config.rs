//! Application configuration and persistence utilities.
//!
//! Settings live in a single JSON file in the platform config directory.
//! A missing file means defaults; a corrupted one is backed up and replaced
//! with defaults by the caller.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{ErrorCorrection, RenderOptions, Rgb};

/// Configuration error type.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Other configuration error.
    #[error("{0}")]
    Other(String),
}

/// Theme configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThemeConfig {
    /// Follow terminal background.
    #[default]
    System,
    /// Force light theme.
    Light,
    /// Force dark theme.
    Dark,
}

impl ThemeConfig {
    /// Get display label.
    pub fn label(&self) -> &'static str {
        match self {
            ThemeConfig::System => "System",
            ThemeConfig::Light => "Light",
            ThemeConfig::Dark => "Dark",
        }
    }

    pub fn next(&self) -> ThemeConfig {
        match self {
            ThemeConfig::System => ThemeConfig::Light,
            ThemeConfig::Light => ThemeConfig::Dark,
            ThemeConfig::Dark => ThemeConfig::System,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generated image side length in pixels.
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub error_correction: ErrorCorrection,
    /// Quiet zone in modules.
    #[serde(default = "default_margin")]
    pub margin: u32,
    #[serde(default = "default_foreground")]
    pub foreground: Rgb,
    #[serde(default = "default_background")]
    pub background: Rgb,
    /// Quiet period before generating, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Interval between camera frame samples, in milliseconds.
    #[serde(default = "default_scan_refresh_ms")]
    pub scan_refresh_ms: u64,
    #[serde(default)]
    pub theme: ThemeConfig,
    /// Where saved PNGs go. Defaults to the platform download dir.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_size() -> u32 {
    256
}

fn default_margin() -> u32 {
    4
}

fn default_foreground() -> Rgb {
    Rgb::BLACK
}

fn default_background() -> Rgb {
    Rgb::WHITE
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_scan_refresh_ms() -> u64 {
    33
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            size: default_size(),
            error_correction: ErrorCorrection::default(),
            margin: default_margin(),
            foreground: default_foreground(),
            background: default_background(),
            debounce_ms: default_debounce_ms(),
            scan_refresh_ms: default_scan_refresh_ms(),
            theme: ThemeConfig::System,
            download_dir: None,
        }
    }
}

impl AppConfig {
    /// Render options for new generation requests.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            size: self.size,
            margin: self.margin,
            foreground: self.foreground,
            background: self.background,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Frame sample interval, never below 1ms.
    pub fn scan_refresh(&self) -> Duration {
        Duration::from_millis(self.scan_refresh_ms.max(1))
    }

    /// Configured download directory, else the user's download dir, else the cwd.
    pub fn resolve_download_dir(&self) -> PathBuf {
        if let Some(dir) = &self.download_dir {
            return dir.clone();
        }
        directories::UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

// ==================== Path Utilities ====================

/// Get the config directory.
pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("dev", "qrkit", "qrkit")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| ConfigError::Other("Could not determine config directory".to_string()))
}

/// Get the config file path.
pub fn get_config_path() -> Result<PathBuf, ConfigError> {
    get_config_dir().map(|dir| dir.join("config.json"))
}

// ==================== Config I/O ====================

/// Load configuration from disk.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&get_config_path()?)
}

/// Load configuration from a specific file. Missing file → defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path)?;
    let config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save configuration to disk.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path()?)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

/// Backup a corrupted config file for debugging. Returns the backup path.
pub fn backup_corrupted_config(path: &Path) -> Result<PathBuf, ConfigError> {
    let parent = path
        .parent()
        .ok_or_else(|| ConfigError::Other("Config path has no parent".to_string()))?;
    let backup_path = parent.join(format!(
        "config.backup.{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));
    fs::copy(path, &backup_path)?;
    Ok(backup_path)
}
