//! Configuration file schema

use crate::config::defaults::*;
use crate::rpc::{ChannelOptions, ServerCommand};
use crate::search::SearchEngine;
use crate::types::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub monitoring: MonitoringSettings,
    pub search: SearchSettings,
    pub database: DatabaseSettings,
    pub client: ClientSettings,
    /// Overrides for how each named server is launched.
    pub servers: HashMap<String, ServerCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_APP_HOST.to_string(),
            port: DEFAULT_APP_PORT,
            request_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub default_engine: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_engine: DEFAULT_SEARCH_ENGINE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// MongoDB connection string used until `connect_database` picks another.
    pub uri: String,
    pub name: String,
    /// Server selection and connect timeout.
    pub timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_DATABASE_URI.to_string(),
            name: DEFAULT_DATABASE_NAME.to_string(),
            timeout_secs: DEFAULT_DATABASE_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub request_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub inherit_stderr: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            inherit_stderr: false,
        }
    }
}

impl AppConfig {
    /// Launch command for `name`: the configured one, else the built-in.
    pub fn server_command(&self, name: &str) -> Result<ServerCommand, ConfigError> {
        if let Some(command) = self.servers.get(name) {
            return Ok(command.clone());
        }

        builtin_server_commands()
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownServer(name.to_string()))
    }

    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            request_timeout: Duration::from_millis(self.client.request_timeout_ms),
            shutdown_timeout: Duration::from_millis(self.client.shutdown_timeout_ms),
            inherit_stderr: self.client.inherit_stderr,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.host.trim().is_empty() {
            return Err(ConfigError::Invalid("monitoring.host is empty".to_string()));
        }
        if self.monitoring.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitoring.request_timeout_secs must be positive".to_string(),
            ));
        }
        if let Err(e) = self.search.default_engine.parse::<SearchEngine>() {
            return Err(ConfigError::Invalid(format!("search.default_engine: {}", e)));
        }
        if self.database.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("database.uri is empty".to_string()));
        }
        if self.database.name.trim().is_empty() {
            return Err(ConfigError::Invalid("database.name is empty".to_string()));
        }
        if self.database.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "database.timeout_secs must be positive".to_string(),
            ));
        }
        if self.client.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "client.request_timeout_ms must be positive".to_string(),
            ));
        }
        for (name, command) in &self.servers {
            if command.program.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "servers.{}.program is empty",
                    name
                )));
            }
        }
        Ok(())
    }
}
