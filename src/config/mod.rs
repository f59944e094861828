//! Configuration system for mcpwatch
//!
//! A single TOML file overrides the built-in defaults section by section.

mod defaults;
mod loader;
mod user_config;

pub use defaults::{
    builtin_server_commands, BUILTIN_SERVERS, DEFAULT_APP_HOST, DEFAULT_APP_PORT,
    DEFAULT_DATABASE_NAME, DEFAULT_DATABASE_URI, DEFAULT_SEARCH_ENGINE,
};
pub use loader::{ConfigLoader, CONFIG_ENV_VAR};
pub use user_config::{
    AppConfig, ClientSettings, DatabaseSettings, MonitoringSettings, SearchSettings,
};
