//! Tool provider seam
//!
//! A server process hosts exactly one provider. Providers never fail a call
//! at the JSON-RPC level: bad arguments and unreachable collaborators come
//! back as a `CallToolResult` flagged `isError`.

use crate::rpc::protocol::{CallToolResult, Tool};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Server name reported by `initialize`.
    fn name(&self) -> &str;

    /// Static tool list for the lifetime of the process.
    fn tools(&self) -> Vec<Tool>;

    /// `cancel` fires when the client goes away or the server shuts down.
    /// Long-running tools should stop early and report what they have.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> CallToolResult;
}

/// Deserialize tool arguments, treating `null` as an empty object.
pub fn parse_arguments<T: DeserializeOwned>(arguments: Value) -> Result<T, CallToolResult> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };

    serde_json::from_value(arguments)
        .map_err(|e| CallToolResult::error(format!("Invalid arguments: {}", e)))
}

pub fn unknown_tool(name: &str) -> CallToolResult {
    CallToolResult::error(format!("Unknown tool: {}", name))
}
