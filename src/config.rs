//! Configuration Management
//!
//! Handles persistent configuration storage for opreg.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Request timeout used when none is configured
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Base URL of a remote document service
    #[serde(default)]
    pub store_url: Option<String>,
    /// Local store file, used when no store URL is set
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Bearer token for the remote document service
    #[serde(default)]
    pub token: Option<String>,
    /// Remote request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("opreg").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file. Missing or unreadable files
    /// give the default configuration.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get effective store URL (CLI > config)
    pub fn effective_store_url(&self, cli: Option<&str>) -> Option<String> {
        cli.map(String::from)
            .or_else(|| self.store_url.clone())
            .filter(|url| !url.trim().is_empty())
    }

    /// Get effective store file (CLI > config > data dir default)
    pub fn effective_store_path(&self, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| self.store_path.clone())
            .or_else(|| dirs::data_dir().map(|p| p.join("opreg").join("store.json")))
            .unwrap_or_else(|| PathBuf::from("opreg-store.json"))
    }

    /// Get effective request timeout
    pub fn effective_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("opreg-config-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = Config::load_from(&temp_path("config.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.effective_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_malformed_file_is_default() {
        let path = temp_path("config.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_save_and_reload() {
        let path = temp_path("config.json");
        let config = Config {
            store_url: Some("http://localhost:8000".to_string()),
            token: Some("secret".to_string()),
            timeout_secs: Some(5),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.effective_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config {
            store_url: Some("http://from-config".to_string()),
            store_path: Some(PathBuf::from("/tmp/from-config.json")),
            ..Default::default()
        };

        assert_eq!(
            config.effective_store_url(Some("http://from-cli")).as_deref(),
            Some("http://from-cli")
        );
        assert_eq!(
            config.effective_store_url(None).as_deref(),
            Some("http://from-config")
        );
        assert_eq!(
            config.effective_store_path(Some(Path::new("/tmp/cli.json"))),
            PathBuf::from("/tmp/cli.json")
        );
        assert_eq!(
            config.effective_store_path(None),
            PathBuf::from("/tmp/from-config.json")
        );
    }

    #[test]
    fn test_blank_store_url_is_none() {
        let config = Config {
            store_url: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.effective_store_url(None), None);
    }
}
