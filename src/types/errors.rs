use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a stdio RPC channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Server returned error [{code}]: {message}")]
    Rpc { code: i32, message: String },

    #[error("Channel is {state}, expected started")]
    InvalidState { state: &'static str },

    /// Rejected before anything was sent; the channel is untouched.
    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

impl ChannelError {
    /// Pipe failures and timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Malformed lines, id mismatches and error objects sent by the peer.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Rpc { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors talking to the monitored application's HTTP endpoints.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid monitoring target {0}")]
    InvalidTarget(String),

    #[error("Failed to connect to app: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("Invalid trend settings: {0}")]
    InvalidTrend(String),
}

/// Errors talking to the document database.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database '{database}': {reason}")]
    Connect { database: String, reason: String },

    #[error("Database request failed: {0}")]
    Driver(#[from] mongodb::error::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unexpected reply to {command}: {reason}")]
    Decode { command: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown server '{0}'")]
    UnknownServer(String),

    #[error("Configuration error: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
