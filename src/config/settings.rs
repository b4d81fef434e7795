//! User configuration settings
//!
//! Layered configuration: defaults → config file → environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};
use crate::runner::{DEFAULT_MAX_RETRIES, FallbackEncoding};

/// Prefix for environment overrides (`GIT_PIPELINE_MAX_RETRIES`, ...)
pub const ENV_PREFIX: &str = "GIT_PIPELINE_";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit git binary; discovered on PATH when unset
    pub git_command: Option<String>,

    /// Explicit gitk binary
    pub gitk_command: Option<String>,

    /// Binary that replaces `git flow ...` invocations
    pub git_flow_command: Option<String>,

    /// Attempts per invocation while git reports a locked index
    pub max_retries: u32,

    /// Delay between locked-index retries in milliseconds
    pub retry_delay_ms: u64,

    /// Encoding label used when command output is not valid UTF-8
    pub fallback_encoding: Option<String>,

    /// Git root lookup cache TTL in milliseconds
    pub root_cache_ttl_ms: u64,

    /// Enable debug logging
    pub debug: bool,

    /// Log file path (if set, logs to file instead of stderr)
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            git_command: None,
            gitk_command: None,
            git_flow_command: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: 100,
            fallback_encoding: None,
            root_cache_ttl_ms: 5000,
            debug: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration layering a specific file over the defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Layer config file if it exists
            .merge(Toml::file(config_path))
            // Layer environment variables (GIT_PIPELINE_MAX_RETRIES, etc.)
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runner cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_retries".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }

        if let Some(label) = &self.fallback_encoding {
            if FallbackEncoding::from_label(label).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: "fallback_encoding".to_string(),
                    reason: format!("unknown encoding '{}'", label),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Delay between locked-index retries
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Git root cache TTL
    pub fn root_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.root_cache_ttl_ms)
    }

    /// Resolved fallback encoding, if one is configured
    pub fn fallback(&self) -> Option<FallbackEncoding> {
        self.fallback_encoding
            .as_deref()
            .and_then(FallbackEncoding::from_label)
    }

    /// Get the configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Save current configuration to the default file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path()?;
        self.save_to(&config_path)
    }

    /// Save current configuration to a specific file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(parent.to_path_buf()))
            })?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        std::fs::write(config_path, toml).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "git-pipeline", "git-pipeline").ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay(), Duration::from_millis(100));
        assert_eq!(config.root_cache_ttl(), Duration::from_secs(5));
        assert!(config.git_command.is_none());
        assert!(config.fallback().is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            git_command: Some("/opt/git/bin/git".to_string()),
            ..Config::default()
        };
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("max_retries"));
        assert!(toml.contains("/opt/git/bin/git"));
    }

    #[test]
    fn test_load_from_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "max_retries = 2\nfallback_encoding = \"Western (Windows 1252)\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.retry_delay_ms, 100);
        assert_eq!(config.fallback().unwrap().name(), "windows-1252");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            gitk_command: Some("gitk-wrapper".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.gitk_command.as_deref(), Some("gitk-wrapper"));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = Config {
            max_retries: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_encoding() {
        let config = Config {
            fallback_encoding: Some("klingon".to_string()),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fallback_encoding"));
    }
}
