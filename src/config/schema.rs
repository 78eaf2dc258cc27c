//! Configuration schema for autopkg-runner
//!
//! Configuration is stored at `~/.config/autopkg-runner/config.toml`.
//! Every section is optional; environment variables and flags override it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Filesystem locations
    pub paths: PathsConfig,

    /// Slack notification settings
    pub notify: NotifyConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Locations of shared files and the external tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Cross-run download metadata cache
    pub metadata_cache: PathBuf,

    /// Report plist the tool writes after each recipe
    pub report_plist: PathBuf,

    /// AutoPkg executable
    pub autopkg: PathBuf,

    /// Explicit recipe search directories (skips the AutoPkg preferences lookup)
    pub recipe_search_dirs: Vec<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            metadata_cache: PathBuf::from("/tmp/autopkg_metadata.json"),
            report_plist: PathBuf::from("/tmp/autopkg.plist"),
            autopkg: PathBuf::from("/usr/local/bin/autopkg"),
            recipe_search_dirs: vec![],
        }
    }
}

/// Slack webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Incoming webhook URL
    pub slack_webhook: Option<String>,

    /// Username shown on posted attachments
    pub username: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            slack_webhook: None,
            username: "Autopkg".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[paths]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.paths.report_plist, PathBuf::from("/tmp/autopkg.plist"));
        assert_eq!(config.notify.username, "Autopkg");
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [paths]
            metadata_cache = "/var/tmp/metadata.json"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.paths.metadata_cache,
            PathBuf::from("/var/tmp/metadata.json")
        );
        assert_eq!(config.paths.autopkg, PathBuf::from("/usr/local/bin/autopkg"));
    }
}
