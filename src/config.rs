use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::remote::DEFAULT_PAGE_SIZE;
use crate::sync::DEFAULT_MAX_PARALLEL;

/// Main configuration structure for sparsesync
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Gitea server and account settings
    #[serde(default)]
    pub service: ServiceConfig,

    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gitea service configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Gitea server base URL
    #[serde(default = "default_service_url")]
    pub url: String,

    /// Account username (may be overridden on the command line)
    pub username: Option<String>,

    /// Items requested per API page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Default destination directory for mirrored repositories
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Maximum parallel fetch/sync tasks
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_service_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}
fn default_destination() -> String {
    "${HOME}/gitea-mirror".to_string()
}
fn default_max_parallel() -> usize {
    DEFAULT_MAX_PARALLEL
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            username: None,
            page_size: default_page_size(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location or create a default config
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("sparsesync").join("config.yml"))
    }

    /// Expand environment variables in configuration paths
    pub fn expand_paths(&mut self) -> Result<()> {
        self.sync.destination = shellexpand::full(&self.sync.destination)
            .context("Failed to expand destination path")?
            .into_owned();

        Ok(())
    }

    /// Destination directory as a path, after expansion
    pub fn destination_path(&self) -> PathBuf {
        PathBuf::from(&self.sync.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.service.url, "http://localhost:3000");
        assert_eq!(config.service.page_size, 50);
        assert!(config.service.username.is_none());
        assert_eq!(config.sync.max_parallel, 15);
        assert_eq!(config.sync.destination, "${HOME}/gitea-mirror");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_expand_paths() {
        env::set_var("TEST_SPARSESYNC_HOME", "/test/home");

        let mut config = Config::default();
        config.sync.destination = "${TEST_SPARSESYNC_HOME}/mirror".to_string();

        config.expand_paths().expect("Failed to expand paths");

        assert_eq!(config.sync.destination, "/test/home/mirror");

        env::remove_var("TEST_SPARSESYNC_HOME");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let nonexistent_path = Path::new("/nonexistent/path/config.yml");
        let result = Config::load(nonexistent_path);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config = Config::default();
        config.service.url = "https://git.example.com".to_string();
        config.service.username = Some("alice".to_string());
        config.sync.destination = "/custom/mirror".to_string();
        config.sync.max_parallel = 8;

        config.save(&config_path).expect("Failed to save config");

        let loaded = Config::load(&config_path).expect("Failed to load config");

        assert_eq!(loaded.service.url, "https://git.example.com");
        assert_eq!(loaded.service.username, Some("alice".to_string()));
        assert_eq!(loaded.sync.destination, "/custom/mirror");
        assert_eq!(loaded.sync.max_parallel, 8);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml_content = r#"
service:
  url: "https://git.example.com"
  username: "alice"
  page_size: 25
sync:
  destination: "/data/mirror"
  max_parallel: 4
logging:
  level: "debug"
"#;

        let config: Config = serde_yaml::from_str(yaml_content).expect("Failed to parse YAML");

        assert_eq!(config.service.url, "https://git.example.com");
        assert_eq!(config.service.username, Some("alice".to_string()));
        assert_eq!(config.service.page_size, 25);
        assert_eq!(config.sync.destination, "/data/mirror");
        assert_eq!(config.sync.max_parallel, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config = serde_yaml::from_str("service:\n  url: \"http://git.local\"\n")
            .expect("Failed to parse YAML");

        assert_eq!(config.service.url, "http://git.local");
        assert_eq!(config.service.page_size, 50);
        assert_eq!(config.sync.max_parallel, 15);
    }
}
