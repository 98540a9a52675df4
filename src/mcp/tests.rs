//! MCP Protocol Implementation Tests
//!
//! Tool definitions, request routing and error replies.

#[cfg(test)]
mod tool_definition_tests {
    use crate::mcp::tools::{AddKnowledgeHandler, ChatHandler, ChatWithImageHandler};

    #[test]
    fn chat_tool_definition() {
        let tool = ChatHandler::tool_definition();
        assert_eq!(tool.name, "chat");

        let required = tool.input_schema["required"]
            .as_array()
            .expect("has required array");
        assert_eq!(required, &vec![serde_json::json!("message")]);
    }

    #[test]
    fn chat_with_image_tool_definition() {
        let tool = ChatWithImageHandler::tool_definition();
        assert_eq!(tool.name, "chat_with_image");

        let properties = tool.input_schema["properties"]
            .as_object()
            .expect("has properties");
        assert!(properties.contains_key("image"));
        assert!(properties.contains_key("mimeType"));
    }

    #[test]
    fn add_knowledge_tool_definition() {
        let tool = AddKnowledgeHandler::tool_definition();
        assert_eq!(tool.name, "add_knowledge");
        assert_eq!(tool.input_schema["required"].as_array().map(Vec::len), Some(2));
    }
}

#[cfg(test)]
mod server_tests {
    use std::sync::Arc;

    use base64::Engine as _;
    use serde_json::{Value, json};

    use crate::chat::{ChatEngine, KNOWLEDGE_ADDED_MESSAGE, NOT_A_CAR_MESSAGE};
    use crate::config::Config;
    use crate::knowledge::{KnowledgeStore, MemoryIndex};
    use crate::mcp::protocol::{JsonRpcMessage, error_codes};
    use crate::mcp::tools::register_chat_tools;
    use crate::mcp::{ConnectionState, McpServer};
    use crate::testing::{HashEmbedder, ScriptedModel};

    async fn server_with(model: ScriptedModel) -> (McpServer, Arc<ScriptedModel>) {
        let store = KnowledgeStore::initialize(
            Arc::new(MemoryIndex::new()),
            Arc::new(HashEmbedder::new()),
        )
        .await
        .expect("store");
        let model = Arc::new(model);
        let engine = Arc::new(ChatEngine::new(
            Arc::new(store),
            Arc::clone(&model) as _,
            &Config::default(),
        ));

        let server = McpServer::new("carchat".to_string(), "0.1.0".to_string());
        register_chat_tools(&server, &engine).await;
        (server, model)
    }

    async fn call(server: &McpServer, request: &Value) -> Value {
        let reply = server
            .handle_line(&request.to_string())
            .await
            .expect("request should get a reply");
        serde_json::to_value(reply).expect("serialize reply")
    }

    fn tool_payload(reply: &Value) -> Value {
        let text = reply["result"]["content"][0]["text"]
            .as_str()
            .expect("text content");
        serde_json::from_str(text).expect("tool text is JSON")
    }

    #[tokio::test]
    async fn initialize_and_list_tools() {
        let (server, _) = server_with(ScriptedModel::default()).await;

        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "2025-06-18",
                    "capabilities": {},
                    "clientInfo": { "name": "test", "version": "1" }
                }
            }),
        )
        .await;
        assert_eq!(reply["result"]["serverInfo"]["name"], "carchat");
        assert_eq!(server.connection_state().await, ConnectionState::Initializing);

        let none = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(none.is_none());
        assert_eq!(server.connection_state().await, ConnectionState::Ready);

        let reply = call(&server, &json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" })).await;
        let names: Vec<&str> = reply["result"]["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert_eq!(names, vec!["add_knowledge", "chat", "chat_with_image"]);
    }

    #[tokio::test]
    async fn unsupported_protocol_version_is_invalid_params() {
        let (server, _) = server_with(ScriptedModel::default()).await;
        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {
                    "protocolVersion": "1999-01-01",
                    "clientInfo": { "name": "test", "version": "1" }
                }
            }),
        )
        .await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn chat_tool_returns_caller_shape() {
        let (server, _) = server_with(ScriptedModel::replying(&["안녕하세요"])).await;

        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": "a", "method": "tools/call",
                "params": { "name": "chat", "arguments": { "message": "추천해줘" } }
            }),
        )
        .await;

        assert_eq!(reply["id"], "a");
        let payload = tool_payload(&reply);
        assert_eq!(payload["response"], "안녕하세요");
        assert!(payload["context_used"].is_array());
        assert!(payload["identified_car"].is_null());
    }

    #[tokio::test]
    async fn chat_with_image_tool_decodes_base64() {
        let (server, model) =
            server_with(ScriptedModel::replying(&["Final Answer: NOT_CAR"])).await;
        let image = base64::engine::general_purpose::STANDARD.encode([0x89, 0x50, 0x4E, 0x47]);

        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {
                    "name": "chat_with_image",
                    "arguments": { "image": image, "mimeType": "image/png" }
                }
            }),
        )
        .await;

        assert_eq!(tool_payload(&reply)["response"], NOT_A_CAR_MESSAGE);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_base64_is_a_tool_error() {
        let (server, model) = server_with(ScriptedModel::default()).await;
        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": { "name": "chat_with_image", "arguments": { "image": "%%%" } }
            }),
        )
        .await;

        assert_eq!(reply["result"]["isError"], true);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn add_knowledge_tool() {
        let (server, _) = server_with(ScriptedModel::default()).await;
        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {
                    "name": "add_knowledge",
                    "arguments": { "content": "신차 정보", "source": "manual" }
                }
            }),
        )
        .await;

        let payload = tool_payload(&reply);
        assert_eq!(payload["message"], KNOWLEDGE_ADDED_MESSAGE);
        assert_eq!(payload["source"], "manual");
    }

    #[tokio::test]
    async fn missing_argument_is_internal_error() {
        let (server, _) = server_with(ScriptedModel::default()).await;
        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 6, "method": "tools/call",
                "params": { "name": "chat", "arguments": {} }
            }),
        )
        .await;

        assert_eq!(reply["error"]["code"], error_codes::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn routing_errors() {
        let (server, _) = server_with(ScriptedModel::default()).await;

        let reply = call(&server, &json!({ "jsonrpc": "2.0", "id": 7, "method": "resources/list" })).await;
        assert_eq!(reply["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let reply = call(
            &server,
            &json!({
                "jsonrpc": "2.0", "id": 8, "method": "tools/call",
                "params": { "name": "search_docs" }
            }),
        )
        .await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_PARAMS);

        let reply = server.handle_line("not json").await.expect("reply");
        assert!(matches!(reply, JsonRpcMessage::ErrorResponse(ref e) if e.error.code == error_codes::PARSE_ERROR));

        let reply = call(&server, &json!({ "jsonrpc": "1.0", "id": 9, "method": "ping" })).await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(reply["id"], 9);
    }

    #[tokio::test]
    async fn serve_reads_until_eof() {
        let (server, _) = server_with(ScriptedModel::default()).await;
        let input = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n".to_vec();
        let mut output = Vec::new();

        server
            .serve(tokio::io::BufReader::new(&input[..]), &mut output)
            .await
            .expect("serve");

        let text = String::from_utf8(output).expect("utf8");
        let reply: Value = serde_json::from_str(text.trim()).expect("one reply line");
        assert_eq!(reply["id"], 1);
        assert_eq!(server.connection_state().await, ConnectionState::Closed);
    }
}
