//! MCP server implementation
//!
//! Hosts one tool provider on newline-delimited JSON-RPC over stdio.

use crate::mcp::tools::ToolProvider;
use crate::rpc::protocol::*;
use crate::rpc::LineTransport;
use crate::types::ChannelError;
use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct McpServer {
    provider: Arc<dyn ToolProvider>,
    initialized: AtomicBool,
    shutdown: CancellationToken,
}

impl McpServer {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider,
            initialized: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop reading requests once `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Serve on the process's own stdin/stdout until EOF or shutdown.
    pub async fn run(&self) -> Result<()> {
        info!("MCP server '{}' starting on stdio", self.provider.name());
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut transport = LineTransport::new(reader, writer);
        // Lines that arrived while a tool call was running.
        let mut pending = VecDeque::new();
        let mut input_closed = false;

        loop {
            if self.shutdown.is_cancelled() {
                info!("Shutdown requested");
                return Ok(());
            }

            let incoming = match pending.pop_front() {
                Some(incoming) => incoming,
                None if input_closed => {
                    info!("Client closed connection");
                    return Ok(());
                }
                None => {
                    let next = tokio::select! {
                        next = next_incoming(&mut transport) => next?,
                        _ = self.shutdown.cancelled() => {
                            info!("Shutdown requested");
                            return Ok(());
                        }
                    };

                    let Some(incoming) = next else {
                        info!("Client closed connection");
                        return Ok(());
                    };
                    incoming
                }
            };

            let response = match incoming {
                Incoming::Unreadable(reason) => {
                    warn!("Unreadable request line: {}", reason);
                    Some(JsonRpcResponse::failure(
                        None,
                        JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", reason)),
                    ))
                }
                Incoming::Line(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    debug!("Received request: {}", line);

                    let cancel = self.shutdown.child_token();
                    if input_closed {
                        cancel.cancel();
                    }

                    let handled = self.handle_line_until(line, &cancel);
                    tokio::pin!(handled);

                    // Keep watching the input so EOF cancels a long call.
                    loop {
                        tokio::select! {
                            biased;
                            response = &mut handled => break response,
                            next = next_incoming(&mut transport), if !input_closed => match next {
                                Ok(Some(incoming)) => pending.push_back(incoming),
                                Ok(None) => {
                                    info!("Client closed connection, cancelling running request");
                                    input_closed = true;
                                    cancel.cancel();
                                }
                                Err(e) => {
                                    warn!("Input failed during request: {}", e);
                                    input_closed = true;
                                    cancel.cancel();
                                }
                            },
                        }
                    }
                }
            };

            let Some(response) = response else {
                continue;
            };

            match transport.write_message(&response).await {
                Ok(()) => debug!("Sent response {:?}", response.id),
                Err(e) if input_closed => {
                    debug!("Client gone, dropped response {:?}: {}", response.id, e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Handle one request line. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        self.handle_line_until(line, &self.shutdown.child_token()).await
    }

    /// As [`handle_line`](Self::handle_line), with `cancel` handed to the
    /// provider for `tools/call`.
    pub async fn handle_line_until(
        &self,
        line: &str,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                return Some(JsonRpcResponse::failure(
                    None,
                    JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", e)),
                ));
            }
        };

        let request: JsonRpcRequest = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = value.get("id").and_then(Value::as_u64);
                return Some(JsonRpcResponse::failure(
                    id,
                    JsonRpcError::new(INVALID_REQUEST, format!("Invalid request: {}", e)),
                ));
            }
        };

        let Some(id) = request.id else {
            debug!("Notification: {}", request.method);
            return None;
        };

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "ping" => Ok(Value::Object(Map::new())),
            "tools/list" => self.handle_list_tools(),
            "tools/call" => self.handle_call_tool(request.params, cancel).await,
            _ => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            )),
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(Some(id), result),
            Err(error) => JsonRpcResponse::failure(Some(id), error),
        })
    }

    fn handle_initialize(&self, params: Map<String, Value>) -> Result<Value, JsonRpcError> {
        let params: InitializeParams = serde_json::from_value(Value::Object(params))
            .map_err(|e| {
                JsonRpcError::new(INVALID_PARAMS, format!("Invalid initialize params: {}", e))
            })?;

        if let Some(client) = &params.client_info {
            info!("Client connected: {} {}", client.name, client.version);
        }

        self.initialized.store(true, Ordering::SeqCst);

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(serde_json::json!({})),
            },
            server_info: ServerInfo {
                name: self.provider.name().to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        serde_json::to_value(result).map_err(|e| {
            JsonRpcError::new(INTERNAL_ERROR, format!("Failed to serialize result: {}", e))
        })
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: self.provider.tools(),
        };

        serde_json::to_value(result).map_err(|e| {
            JsonRpcError::new(INTERNAL_ERROR, format!("Failed to serialize tools: {}", e))
        })
    }

    async fn handle_call_tool(
        &self,
        params: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Value, JsonRpcError> {
        let params: CallToolParams = serde_json::from_value(Value::Object(params)).map_err(|e| {
            JsonRpcError::new(INVALID_PARAMS, format!("Invalid tool call params: {}", e))
        })?;

        if !self.is_initialized() {
            debug!("tools/call '{}' before initialize", params.name);
        }

        let result = self
            .provider
            .call_tool(&params.name, params.arguments.unwrap_or(Value::Null), cancel)
            .await;

        if result.is_error() {
            warn!("Tool '{}' returned an error result", params.name);
        }

        serde_json::to_value(result).map_err(|e| {
            JsonRpcError::new(
                INTERNAL_ERROR,
                format!("Failed to serialize tool result: {}", e),
            )
        })
    }
}

/// An input line as the serve loop sees it.
enum Incoming {
    Line(String),
    Unreadable(String),
}

/// Next input line, `None` at EOF. Lines that cannot be decoded are
/// reported rather than ending the stream.
async fn next_incoming<R, W>(
    transport: &mut LineTransport<R, W>,
) -> std::result::Result<Option<Incoming>, ChannelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match transport.read_line().await {
        Ok(Some(line)) => Ok(Some(Incoming::Line(line))),
        Ok(None) => Ok(None),
        Err(ChannelError::Protocol(reason)) => Ok(Some(Incoming::Unreadable(reason))),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::{parse_arguments, unknown_tool};
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    struct EchoTools;

    #[derive(Deserialize)]
    struct EchoArgs {
        message: String,
    }

    #[async_trait]
    impl ToolProvider for EchoTools {
        fn name(&self) -> &str {
            "echo"
        }

        fn tools(&self) -> Vec<Tool> {
            vec![Tool::new(
                "echo",
                "Echo a message",
                vec![("message", ParameterSpec::string("Text to echo").required())],
            )]
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Value,
            cancel: &CancellationToken,
        ) -> CallToolResult {
            match name {
                "echo" => match parse_arguments::<EchoArgs>(arguments) {
                    Ok(args) => CallToolResult::text(args.message),
                    Err(result) => result,
                },
                "slow" => {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    CallToolResult::text("slow done")
                }
                "wait" => tokio::select! {
                    _ = cancel.cancelled() => CallToolResult::text("wait cancelled"),
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {
                        CallToolResult::text("wait finished")
                    }
                },
                _ => unknown_tool(name),
            }
        }
    }

    fn server() -> McpServer {
        McpServer::new(Arc::new(EchoTools))
    }

    #[tokio::test]
    async fn test_parse_error_has_null_id() {
        let response = server().handle_line("{not json").await.unwrap();
        assert_eq!(response.id, None);
        assert_eq!(response.error.unwrap().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_invalid_request_keeps_id() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":4,"params":{}}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Some(4));
        assert_eq!(response.error.unwrap().code, INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(response.id, Some(2));
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn test_initialize_marks_server_initialized() {
        let server = server();
        assert!(!server.is_initialized());

        let response = server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","clientInfo":{"name":"test","version":"0"}}}"#)
            .await
            .unwrap();

        let result = response.into_result().unwrap();
        assert_eq!(result["serverInfo"]["name"], "echo");
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(server.is_initialized());
    }

    #[tokio::test]
    async fn test_call_tool_without_initialize() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"echo","arguments":{"message":"hi"}}}"#)
            .await
            .unwrap();

        let result: CallToolResult =
            serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(result.joined_text(), "hi");
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_call_tool_missing_name_is_invalid_params() {
        let response = server()
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_serve_over_pipes() {
        let (mut client_out, server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);

        let handle = tokio::spawn(async move { server().serve(server_in, server_out).await });

        client_out
            .write_all(b"\n{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_in).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let response: JsonRpcResponse = serde_json::from_str(&line).unwrap();
        assert_eq!(response.id, Some(1));
        assert_eq!(response.into_result().unwrap()["tools"][0]["name"], json!("echo"));

        drop(client_out);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (_client_out, server_in) = duplex(4096);
        let (server_out, _client_in) = duplex(4096);
        let token = CancellationToken::new();

        let server = server().with_shutdown(token.clone());
        let handle = tokio::spawn(async move { server.serve(server_in, server_out).await });

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    fn call_line(id: u64, name: &str) -> String {
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {"name": name}
        });
        format!("{}\n", request)
    }

    async fn next_response(lines: &mut Lines<BufReader<DuplexStream>>) -> JsonRpcResponse {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_unreadable_line_is_answered_and_serving_continues() {
        let (mut client_out, server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);

        let handle = tokio::spawn(async move { server().serve(server_in, server_out).await });

        client_out.write_all(b"\xff\xfe garbage\n").await.unwrap();
        client_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_in).lines();

        let rejected = next_response(&mut lines).await;
        assert_eq!(rejected.id, None);
        assert_eq!(rejected.error.unwrap().code, PARSE_ERROR);

        let listed = next_response(&mut lines).await;
        assert_eq!(listed.id, Some(1));
        assert!(listed.error.is_none());

        drop(client_out);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closing_input_cancels_running_call() {
        let (mut client_out, server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);

        let handle = tokio::spawn(async move { server().serve(server_in, server_out).await });

        client_out
            .write_all(call_line(7, "wait").as_bytes())
            .await
            .unwrap();
        drop(client_out);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("serve kept running after input closed")
            .unwrap()
            .unwrap();

        let mut lines = BufReader::new(client_in).lines();
        let response = next_response(&mut lines).await;
        assert_eq!(response.id, Some(7));
        let result: CallToolResult =
            serde_json::from_value(response.into_result().unwrap()).unwrap();
        assert_eq!(result.joined_text(), "wait cancelled");
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_call() {
        let (mut client_out, server_in) = duplex(4096);
        let (server_out, _client_in) = duplex(4096);
        let token = CancellationToken::new();

        let server = server().with_shutdown(token.clone());
        let handle = tokio::spawn(async move { server.serve(server_in, server_out).await });

        client_out
            .write_all(call_line(1, "wait").as_bytes())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("serve kept running after shutdown")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_requests_sent_during_a_call_are_answered_in_order() {
        let (mut client_out, server_in) = duplex(4096);
        let (server_out, client_in) = duplex(4096);

        let handle = tokio::spawn(async move { server().serve(server_in, server_out).await });

        let batch = format!("{}{}", call_line(1, "slow"), call_line(2, "slow"));
        client_out.write_all(batch.as_bytes()).await.unwrap();

        let mut lines = BufReader::new(client_in).lines();
        for id in [1, 2] {
            let response = next_response(&mut lines).await;
            assert_eq!(response.id, Some(id));
            let result: CallToolResult =
                serde_json::from_value(response.into_result().unwrap()).unwrap();
            assert_eq!(result.joined_text(), "slow done");
        }

        drop(client_out);
        handle.await.unwrap().unwrap();
    }
}
