//! mcpwatch - MCP demo servers and a stdio JSON-RPC client
//!
//! Hosts three tool servers on newline-delimited JSON-RPC over stdio. One
//! reports on a monitored application's HTTP endpoints, one answers simulated
//! web searches and one inspects the application's todo database. The client
//! side launches a server as a child process and exchanges requests with it
//! through [`StdioChannel`].

pub mod config;
pub mod database;
pub mod demo;
pub mod mcp;
pub mod monitoring;
pub mod rpc;
pub mod search;
pub mod types;

pub use config::{AppConfig, ConfigLoader};
pub use database::{DatabaseTools, MongoConnector};
pub use mcp::{McpServer, ToolProvider};
pub use monitoring::{AppMonitor, MonitorTarget, MonitoringTools};
pub use rpc::{ChannelOptions, ChannelState, ServerCommand, StdioChannel};
pub use search::{SearchTools, WebSearchService};
pub use types::{ChannelError, ConfigError, DatabaseError, MonitorError};
