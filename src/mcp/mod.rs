//! MCP server host and the tool provider trait

pub mod server;
pub mod tools;

pub use server::McpServer;
pub use tools::ToolProvider;
