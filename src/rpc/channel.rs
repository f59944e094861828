//! Stdio RPC channel
//!
//! Owns one child server process and the pipes to its stdin/stdout. Requests
//! are serialized: the slot mutex is held for a whole write/read round trip,
//! so concurrent callers on one channel never read each other's responses.

use crate::rpc::protocol::{
    CallToolResult, InitializeResult, JsonRpcRequest, JsonRpcResponse, ServerInfo, Tool,
    MCP_PROTOCOL_VERSION,
};
use crate::rpc::transport::LineTransport;
use crate::types::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How to launch a server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            env: HashMap::new(),
            cwd: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Upper bound on one request/response round trip.
    pub request_timeout: Duration,
    /// Grace period after closing the child's stdin before it is killed.
    pub shutdown_timeout: Duration,
    /// Forward the child's stderr instead of discarding it.
    pub inherit_stderr: bool,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            inherit_stderr: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unstarted,
    Started,
    Stopped,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

struct Session {
    child: Child,
    transport: LineTransport<ChildStdout, ChildStdin>,
    /// Set after a failed exchange: the byte stream may hold a stale or
    /// partial response, so later reads can be misaligned.
    desynchronized: bool,
}

enum Slot {
    Unstarted,
    Started(Session),
    Stopped,
}

impl Slot {
    fn state(&self) -> ChannelState {
        match self {
            Slot::Unstarted => ChannelState::Unstarted,
            Slot::Started(_) => ChannelState::Started,
            Slot::Stopped => ChannelState::Stopped,
        }
    }
}

pub struct StdioChannel {
    name: String,
    command: ServerCommand,
    options: ChannelOptions,
    next_id: AtomicU64,
    slot: Mutex<Slot>,
}

impl StdioChannel {
    /// Create an unstarted channel.
    pub fn new(name: impl Into<String>, command: ServerCommand, options: ChannelOptions) -> Self {
        Self {
            name: name.into(),
            command,
            options,
            next_id: AtomicU64::new(1),
            slot: Mutex::new(Slot::Unstarted),
        }
    }

    /// Create a channel and start its server.
    pub async fn launch(
        name: impl Into<String>,
        command: ServerCommand,
        options: ChannelOptions,
    ) -> Result<Self> {
        let channel = Self::new(name, command, options);
        channel.start().await?;
        Ok(channel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> ChannelState {
        self.slot.lock().await.state()
    }

    /// Whether an earlier exchange failed mid-stream.
    ///
    /// The channel still accepts requests, but a desynchronized channel
    /// should be stopped and replaced rather than reused.
    pub async fn is_desynchronized(&self) -> bool {
        match &*self.slot.lock().await {
            Slot::Started(session) => session.desynchronized,
            _ => false,
        }
    }

    /// OS process id of the running server.
    pub async fn pid(&self) -> Option<u32> {
        match &*self.slot.lock().await {
            Slot::Started(session) => session.child.id(),
            _ => None,
        }
    }

    /// Spawn the server with piped stdin/stdout.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        if !matches!(*slot, Slot::Unstarted) {
            return Err(ChannelError::InvalidState {
                state: slot.state().as_str(),
            });
        }

        info!(
            "Starting server '{}': {} {:?}",
            self.name, self.command.program, self.command.args
        );

        let mut command = Command::new(&self.command.program);
        command
            .args(&self.command.args)
            .envs(&self.command.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if self.options.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        if let Some(cwd) = &self.command.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| ChannelError::Launch {
            program: self.command.program.clone(),
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| ChannelError::Launch {
            program: self.command.program.clone(),
            reason: "Failed to capture stdin".to_string(),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| ChannelError::Launch {
            program: self.command.program.clone(),
            reason: "Failed to capture stdout".to_string(),
        })?;

        debug!("Server '{}' running as pid {:?}", self.name, child.id());

        *slot = Slot::Started(Session {
            child,
            transport: LineTransport::new(stdout, stdin),
            desynchronized: false,
        });

        Ok(())
    }

    /// Send one request and read exactly one response line.
    pub async fn send_request(
        &self,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<JsonRpcResponse> {
        self.send_request_within(method, params, self.options.request_timeout).await
    }

    /// As [`send_request`](Self::send_request) with its own deadline instead
    /// of the channel's request timeout.
    pub async fn send_request_within(
        &self,
        method: &str,
        params: Map<String, Value>,
        request_timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        let mut slot = self.slot.lock().await;
        let session = match &mut *slot {
            Slot::Started(session) => session,
            other => {
                return Err(ChannelError::InvalidState {
                    state: other.state().as_str(),
                })
            }
        };

        if session.desynchronized {
            warn!(
                "Reusing channel '{}' after a failed exchange; responses may be misaligned",
                self.name
            );
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        let outcome = match timeout(request_timeout, session.transport.round_trip(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout {
                method: method.to_string(),
                timeout_ms: request_timeout.as_millis() as u64,
            }),
        };

        if let Err(e) = &outcome {
            warn!("Request {} '{}' on '{}' failed: {}", id, method, self.name, e);
            session.desynchronized = true;
        }

        outcome
    }

    /// Send a notification; no response is read.
    pub async fn notify(&self, method: &str, params: Map<String, Value>) -> Result<()> {
        let mut slot = self.slot.lock().await;
        match &mut *slot {
            Slot::Started(session) => {
                session
                    .transport
                    .write_message(&JsonRpcRequest::notification(method, params))
                    .await
            }
            other => Err(ChannelError::InvalidState {
                state: other.state().as_str(),
            }),
        }
    }

    /// MCP handshake: `initialize` followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult> {
        let mut params = Map::new();
        params.insert(
            "protocolVersion".to_string(),
            Value::String(MCP_PROTOCOL_VERSION.to_string()),
        );
        params.insert("capabilities".to_string(), Value::Object(Map::new()));
        params.insert(
            "clientInfo".to_string(),
            serde_json::to_value(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .map_err(|e| ChannelError::Protocol(e.to_string()))?,
        );

        let result = self.send_request("initialize", params).await?.into_result()?;
        let init: InitializeResult = serde_json::from_value(result).map_err(|e| {
            ChannelError::Protocol(format!("Invalid initialize result: {}", e))
        })?;

        self.notify("notifications/initialized", Map::new()).await?;
        Ok(init)
    }

    /// `tools/list`. Accepts a bare array or the `{"tools": [...]}` form.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result = self.send_request("tools/list", Map::new()).await?.into_result()?;

        let tools = match result {
            Value::Array(_) => result,
            Value::Object(mut object) => object.remove("tools").ok_or_else(|| {
                ChannelError::Protocol("tools/list result has no 'tools' field".to_string())
            })?,
            other => {
                return Err(ChannelError::Protocol(format!(
                    "tools/list result is not a list: {}",
                    other
                )))
            }
        };

        serde_json::from_value(tools)
            .map_err(|e| ChannelError::Protocol(format!("Invalid tool descriptor: {}", e)))
    }

    /// `tools/call`. `Value::Null` arguments are sent as an empty object.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        self.call_tool_within(name, arguments, self.options.request_timeout).await
    }

    /// `tools/call` for tools that run longer than the request timeout.
    pub async fn call_tool_within(
        &self,
        name: &str,
        arguments: Value,
        request_timeout: Duration,
    ) -> Result<CallToolResult> {
        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            Value::Object(_) => arguments,
            other => {
                return Err(ChannelError::InvalidArguments(format!(
                    "expected an object, got {}",
                    other
                )))
            }
        };

        let mut params = Map::new();
        params.insert("name".to_string(), Value::String(name.to_string()));
        params.insert("arguments".to_string(), arguments);

        let result = self
            .send_request_within("tools/call", params, request_timeout)
            .await?
            .into_result()?;
        serde_json::from_value(result)
            .map_err(|e| ChannelError::Protocol(format!("Invalid tool result: {}", e)))
    }

    /// Close the server's stdin, wait up to the shutdown timeout, then kill.
    ///
    /// Idempotent; stopping an unstarted channel just marks it stopped.
    pub async fn stop(&self) {
        let mut slot = self.slot.lock().await;
        let previous = std::mem::replace(&mut *slot, Slot::Stopped);
        let previous_state = previous.state();

        let Slot::Started(session) = previous else {
            debug!("Channel '{}' was {}", self.name, previous_state.as_str());
            return;
        };

        let Session {
            mut child,
            transport,
            ..
        } = session;

        // Dropping the transport closes the child's stdin.
        drop(transport);

        match timeout(self.options.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) => info!("Server '{}' exited: {}", self.name, status),
            Ok(Err(e)) => warn!("Failed to wait for server '{}': {}", self.name, e),
            Err(_) => {
                warn!(
                    "Server '{}' did not exit within {:?}, killing it",
                    self.name, self.options.shutdown_timeout
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill server '{}': {}", self.name, e);
                }
            }
        }
    }
}
