//! Built-in defaults
//!
//! These give a zero-config setup: the monitored app on localhost:9090, the
//! todo database on a local MongoDB, and every server launched from this
//! very binary.

use crate::rpc::ServerCommand;
use std::collections::HashMap;

pub const DEFAULT_APP_HOST: &str = "localhost";
pub const DEFAULT_APP_PORT: u16 = 9090;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SEARCH_ENGINE: &str = "duckduckgo";
pub const DEFAULT_DATABASE_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_DATABASE_NAME: &str = "todoapp";
pub const DEFAULT_DATABASE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Names of the servers this binary can host.
pub const BUILTIN_SERVERS: [&str; 3] = ["monitoring", "search", "database"];

/// `<this executable> serve <name>` for every built-in server.
pub fn builtin_server_commands() -> HashMap<String, ServerCommand> {
    let program = std::env::current_exe()
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string());

    BUILTIN_SERVERS
        .iter()
        .map(|name| {
            (
                name.to_string(),
                ServerCommand::new(program.clone(), &["serve", name]),
            )
        })
        .collect()
}
