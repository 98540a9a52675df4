//! MCP Tools Implementation
//!
//! Tool definitions and handlers exposing the chat engine: `chat`,
//! `chat_with_image` and `add_knowledge`.

use crate::chat::ChatEngine;
use crate::mcp::protocol::*;
use crate::mcp::server::{McpServer, ToolHandler};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

const DEFAULT_MIME_TYPE: &str = "image/jpeg";

fn required_str<'a>(args: &'a HashMap<String, Value>, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Missing required parameter: {}", name))
}

fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize tool result")?;
    Ok(CallToolResult::text(text))
}

/// Text chat tool handler
pub struct ChatHandler {
    engine: Arc<ChatEngine>,
}

impl ChatHandler {
    #[inline]
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "chat".to_string(),
            description: Some(
                "Ask the car-shopping assistant a question answered from the vehicle knowledge base"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "User message"
                    }
                },
                "required": ["message"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ChatHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let message = required_str(&args, "message")?;

        debug!("chat tool: {} chars", message.chars().count());
        json_result(&self.engine.chat(message).await)
    }
}

/// Image chat tool handler
pub struct ChatWithImageHandler {
    engine: Arc<ChatEngine>,
}

impl ChatWithImageHandler {
    #[inline]
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "chat_with_image".to_string(),
            description: Some(
                "Identify the vehicle in a photo and describe it from the knowledge base"
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "image": {
                        "type": "string",
                        "description": "Base64-encoded image bytes"
                    },
                    "mimeType": {
                        "type": "string",
                        "description": "Image MIME type (default: image/jpeg)"
                    }
                },
                "required": ["image"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ChatWithImageHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let encoded = required_str(&args, "image")?;
        let mime_type = args
            .get("mimeType")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_MIME_TYPE);

        let bytes = match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Invalid base64 image payload: {}", e);
                return Ok(CallToolResult::error(format!(
                    "Invalid base64 image payload: {}",
                    e
                )));
            }
        };

        json_result(&self.engine.chat_with_image(&bytes, mime_type).await)
    }
}

/// Add-knowledge tool handler
pub struct AddKnowledgeHandler {
    engine: Arc<ChatEngine>,
}

impl AddKnowledgeHandler {
    #[inline]
    pub fn new(engine: Arc<ChatEngine>) -> Self {
        Self { engine }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: "add_knowledge".to_string(),
            description: Some("Append a document to the vehicle knowledge base".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "Document text"
                    },
                    "source": {
                        "type": "string",
                        "description": "Source identifier, e.g. car-<origin-id>"
                    }
                },
                "required": ["content", "source"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for AddKnowledgeHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args = params.arguments.unwrap_or_default();
        let content = required_str(&args, "content")?;
        let source = required_str(&args, "source")?;

        match self.engine.add_knowledge(content, source).await {
            Ok(response) => json_result(&response),
            Err(e) => {
                error!("Failed to add knowledge from {}: {}", source, e);
                Ok(CallToolResult::error(format!("Failed to add knowledge: {}", e)))
            }
        }
    }
}

/// Register every chat tool on `server`
#[inline]
pub async fn register_chat_tools(server: &McpServer, engine: &Arc<ChatEngine>) {
    server
        .register_tool(
            ChatHandler::tool_definition(),
            ChatHandler::new(Arc::clone(engine)),
        )
        .await;
    server
        .register_tool(
            ChatWithImageHandler::tool_definition(),
            ChatWithImageHandler::new(Arc::clone(engine)),
        )
        .await;
    server
        .register_tool(
            AddKnowledgeHandler::tool_definition(),
            AddKnowledgeHandler::new(Arc::clone(engine)),
        )
        .await;
}
