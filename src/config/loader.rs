//! Configuration loader
//!
//! Lookup order (first existing file wins):
//! 1. Explicit `--config` path
//! 2. ./.mcpwatch.toml (project-specific)
//! 3. $MCPWATCH_CONFIG
//! 4. ~/.config/mcpwatch/config.toml (user-global)
//!
//! With no file at all the built-in defaults apply.

use crate::config::AppConfig;
use crate::types::ConfigError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_ENV_VAR: &str = "MCPWATCH_CONFIG";

pub struct ConfigLoader {
    config: AppConfig,
    source: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            // An explicit path must exist.
            let config = Self::from_path(path)?;
            return Ok(Self {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        for path in Self::candidates() {
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                let config = Self::from_path(&path)?;
                info!("Loaded configuration from {}", path.display());
                return Ok(Self {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self {
            config: AppConfig::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<AppConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<AppConfig, ConfigError> {
        let config: AppConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(".mcpwatch.toml"));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(config_path));
        }

        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("mcpwatch").join("config.toml"));
        }

        candidates
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// File the configuration came from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}
