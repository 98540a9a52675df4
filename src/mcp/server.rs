//! MCP Server Implementation
//!
//! Line-delimited JSON-RPC over any async reader/writer pair, with stdio as
//! the production transport.

use crate::mcp::protocol::*;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Connection state tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Tool handler trait for implementing tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

struct RegisteredTool {
    definition: Tool,
    handler: Box<dyn ToolHandler>,
}

/// MCP server state
pub struct McpServer {
    server_info: Implementation,
    capabilities: ServerCapabilities,
    tools: RwLock<BTreeMap<String, RegisteredTool>>,
    connection_state: RwLock<ConnectionState>,
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        Self {
            server_info: Implementation { name, version },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            tools: RwLock::new(BTreeMap::new()),
            connection_state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    /// Register a tool with the server
    #[inline]
    pub async fn register_tool<H>(&self, definition: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let name = definition.name.clone();
        self.tools.write().await.insert(
            name.clone(),
            RegisteredTool {
                definition,
                handler: Box::new(handler),
            },
        );
        debug!("Registered tool: {}", name);
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    /// Start the server using stdio transport
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("Starting MCP server with stdio transport");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Process newline-delimited messages until the reader reaches EOF
    #[inline]
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some(reply) = self.handle_line(trimmed).await {
                        send_message(&mut writer, &reply).await?;
                    }
                }
                Err(e) => {
                    error!("Error reading from transport: {}", e);
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        info!("MCP server stopped");
        Ok(())
    }

    /// Reply to one raw message, if it warrants a reply
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to parse JSON: {}", e);
                return Some(error_reply(JsonRpcError::parse_error(), None));
            }
        };

        if raw.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            warn!("Rejecting message without jsonrpc \"2.0\"");
            return Some(error_reply(JsonRpcError::invalid_request(), request_id(&raw)));
        }

        match serde_json::from_value::<JsonRpcMessage>(raw) {
            Ok(JsonRpcMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(JsonRpcMessage::Notification(notification)) => {
                self.handle_notification(&notification).await;
                None
            }
            Ok(JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_)) => {
                warn!("Received unexpected response message from client");
                None
            }
            Err(e) => {
                error!("Message validation failed: {}", e);
                Some(error_reply(JsonRpcError::invalid_request(), None))
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcMessage {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            other => {
                debug!("Unknown method: {}", other);
                return error_reply(JsonRpcError::method_not_found(), Some(request.id));
            }
        };

        match result {
            Ok(result) => JsonRpcMessage::Response(JsonRpcResponse::new(result, request.id)),
            Err(RequestFailure::InvalidParams(message)) => {
                error_reply(JsonRpcError::invalid_params(message), Some(request.id))
            }
            Err(RequestFailure::Internal(e)) => {
                error!("Error handling request {}: {:#}", request.method, e);
                error_reply(
                    JsonRpcError::internal_error(format!("{:#}", e)),
                    Some(request.id),
                )
            }
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                *self.connection_state.write().await = ConnectionState::Ready;
                info!("Server ready to handle requests");
            }
            "notifications/cancelled" => debug!("Received cancellation notification"),
            other => warn!("Unknown notification method: {}", other),
        }
    }

    async fn handle_initialize(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, RequestFailure> {
        let params: InitializeParams = parse_params(params, "Initialize")?;

        if !SUPPORTED_VERSIONS.contains(&params.protocol_version.as_str()) {
            return Err(RequestFailure::InvalidParams(format!(
                "Unsupported protocol version: {}. Supported: {}",
                params.protocol_version,
                SUPPORTED_VERSIONS.join(", ")
            )));
        }

        *self.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some(
                "Car-shopping assistant: chat, chat_with_image and add_knowledge tools"
                    .to_string(),
            ),
        };

        info!("Client initialized: {}", params.client_info.name);
        to_value(&result)
    }

    async fn handle_list_tools(&self) -> std::result::Result<Value, RequestFailure> {
        let tools = self.tools.read().await;
        let result = ListToolsResult {
            tools: tools.values().map(|t| t.definition.clone()).collect(),
        };
        to_value(&result)
    }

    async fn handle_call_tool(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, RequestFailure> {
        let params: CallToolParams = parse_params(params, "Tool call")?;

        let tools = self.tools.read().await;
        let tool = tools
            .get(&params.name)
            .ok_or_else(|| RequestFailure::InvalidParams(format!("Tool not found: {}", params.name)))?;

        let result = tool
            .handler
            .handle(params)
            .await
            .map_err(RequestFailure::Internal)?;
        to_value(&result)
    }
}

enum RequestFailure {
    InvalidParams(String),
    Internal(anyhow::Error),
}

fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>,
    what: &str,
) -> std::result::Result<T, RequestFailure> {
    let params = params
        .ok_or_else(|| RequestFailure::InvalidParams(format!("{} request missing parameters", what)))?;
    serde_json::from_value(params)
        .map_err(|e| RequestFailure::InvalidParams(format!("Invalid {} parameters: {}", what, e)))
}

fn to_value<T: serde::Serialize>(value: &T) -> std::result::Result<Value, RequestFailure> {
    serde_json::to_value(value)
        .context("Failed to serialize result")
        .map_err(RequestFailure::Internal)
}

fn request_id(raw: &Value) -> Option<RequestId> {
    raw.get("id")
        .and_then(|id| serde_json::from_value(id.clone()).ok())
}

fn error_reply(error: JsonRpcError, id: Option<RequestId>) -> JsonRpcMessage {
    JsonRpcMessage::ErrorResponse(JsonRpcErrorResponse::new(error, id))
}

async fn send_message<W>(writer: &mut W, message: &JsonRpcMessage) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(message)?;
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer
        .flush()
        .await
        .map_err(|e| anyhow!("Failed to flush transport: {}", e))
}
