//! Application configuration management utilities.

use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use camino::Utf8PathBuf;
use neka_kit::ReorganizeOptions;
use serde::{Deserialize, Serialize};

use crate::errors::CliError;

/// Application-wide configuration stored in config.toml.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub image_host: String,
    pub output_dir: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// `0` uses one worker per core.
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        let options = ReorganizeOptions::default();
        Self {
            image_host: options.image_host,
            output_dir: "downloads".to_string(),
            max_retries: options.max_retries,
            timeout_secs: options.timeout.as_secs(),
            workers: options.workers,
        }
    }
}

impl AppConfig {
    pub const KEYS: [&'static str; 5] = [
        "image_host",
        "output_dir",
        "max_retries",
        "timeout_secs",
        "workers",
    ];

    /// Library options for a run, with an optional worker override.
    pub fn reorganize_options(&self, workers: Option<usize>) -> ReorganizeOptions {
        ReorganizeOptions {
            image_host: self.image_host.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            workers: workers.unwrap_or(self.workers),
            ..ReorganizeOptions::default()
        }
    }

    /// Update one field from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CliError> {
        let invalid = || CliError::invalid_config_value(key.to_string(), value.to_string());
        match key {
            "image_host" => self.image_host = value.trim().to_string(),
            "output_dir" => self.output_dir = value.to_string(),
            "max_retries" => self.max_retries = value.parse().map_err(|_| invalid())?,
            "timeout_secs" => self.timeout_secs = value.parse().map_err(|_| invalid())?,
            "workers" => self.workers = value.parse().map_err(|_| invalid())?,
            _ => return Err(CliError::unknown_config_key(key.to_string())),
        }
        Ok(())
    }

    /// Textual value of one field.
    pub fn get(&self, key: &str) -> Option<String> {
        Some(match key {
            "image_host" => self.image_host.clone(),
            "output_dir" => self.output_dir.clone(),
            "max_retries" => self.max_retries.to_string(),
            "timeout_secs" => self.timeout_secs.to_string(),
            "workers" => self.workers.to_string(),
            _ => return None,
        })
    }
}

/// Returns the directory where the current executable resides.
pub fn install_dir() -> Option<Utf8PathBuf> {
    let exe = env::current_exe().ok()?;
    let parent = exe.parent()?;
    Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok()
}

/// Returns the default configuration file path (config.toml next to the executable).
pub fn default_config_path() -> Option<Utf8PathBuf> {
    install_dir().map(|dir| dir.join("config.toml"))
}

/// Loads the application configuration from config.toml.
/// Returns default configuration if file doesn't exist or cannot be parsed.
pub fn load_config() -> AppConfig {
    default_config_path()
        .map(|path| load_config_from(path.as_std_path()))
        .unwrap_or_default()
}

pub fn load_config_from(path: &Path) -> AppConfig {
    match fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e);
            AppConfig::default()
        }),
        Err(_) => AppConfig::default(),
    }
}

/// Saves the application configuration to config.toml.
pub fn save_config(cfg: &AppConfig) -> io::Result<()> {
    match default_config_path() {
        Some(path) => save_config_to(cfg, path.as_std_path()),
        None => Err(io::Error::new(
            io::ErrorKind::NotFound,
            "Could not determine config path",
        )),
    }
}

pub fn save_config_to(cfg: &AppConfig, path: &Path) -> io::Result<()> {
    let content = toml::to_string_pretty(cfg).map_err(io::Error::other)?;
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_parses_values() {
        let mut cfg = AppConfig::default();
        cfg.set("workers", "4").unwrap();
        cfg.set("image_host", " cdn.example ").unwrap();
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.get("image_host").as_deref(), Some("cdn.example"));

        assert!(matches!(
            cfg.set("workers", "many"),
            Err(CliError::InvalidConfigValue { .. })
        ));
        assert!(matches!(
            cfg.set("colour", "red"),
            Err(CliError::UnknownConfigKey { .. })
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        assert_eq!(load_config_from(&path), AppConfig::default());

        let mut cfg = AppConfig::default();
        cfg.set("max_retries", "7").unwrap();
        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_config_from(&path), cfg);

        // Missing keys fall back to defaults.
        fs::write(&path, "workers = 2\n").unwrap();
        let partial = load_config_from(&path);
        assert_eq!(partial.workers, 2);
        assert_eq!(partial.output_dir, "downloads");
    }

    #[test]
    fn options_follow_config() {
        let cfg = AppConfig {
            timeout_secs: 3,
            workers: 2,
            ..AppConfig::default()
        };
        let options = cfg.reorganize_options(Some(1));
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.workers, 1);
        assert_eq!(cfg.reorganize_options(None).workers, 2);
    }
}
