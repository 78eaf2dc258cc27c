//! Configuration management for autopkg-runner
//!
//! One optional TOML file, `autopkg-runner/config.toml` under the user config
//! dir unless `--config` or `AUTOPKG_RUNNER_CONFIG` names another. A missing
//! file means defaults; there is no per-directory file to merge and nothing
//! is ever written back. Flags and environment variables are applied on top
//! when [`Settings`] is resolved.

pub mod schema;
mod settings;

pub use schema::Config;
pub use settings::{read_search_dirs, Settings};

use crate::error::{RunnerError, RunnerResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Locates and reads the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autopkg-runner")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults if the file is absent
    pub async fn load(&self) -> RunnerResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> RunnerResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| RunnerError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| RunnerError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("nonexistent.toml"));

        let config = manager.load().await.unwrap();
        assert_eq!(config.general.log_format, "text");
    }

    #[tokio::test]
    async fn loading_never_creates_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("autopkg-runner");
        let manager = ConfigManager::with_path(dir.join("config.toml"));

        manager.load().await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn load_reads_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[notify]\nusername = \"pkgbot\"\n").unwrap();

        let config = ConfigManager::with_path(path).load().await.unwrap();
        assert_eq!(config.notify.username, "pkgbot");
    }

    #[tokio::test]
    async fn malformed_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[paths\nbroken").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, RunnerError::ConfigInvalid { .. }));
    }
}
