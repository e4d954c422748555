//! MCP (Model Context Protocol) server implementation
//!
//! Provides a stdio JSON-RPC interface exposing the command processor as a tool.

mod protocol;
mod tools;

pub use protocol::*;
pub use tools::*;

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::processor::CommandProcessor;

/// MCP Server for mailcmd
pub struct McpServer {
    tools: ToolHandler,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(processor: Arc<CommandProcessor>) -> Self {
        Self {
            tools: ToolHandler::new(processor),
        }
    }

    /// Run the MCP server on stdio
    pub async fn run(&self) -> Result<()> {
        info!("Starting MCP server on stdio");

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;

            if n == 0 {
                // EOF
                debug!("Received EOF, shutting down");
                break;
            }

            let Some(response_json) = self.handle_line(&line).await? else {
                continue;
            };
            stdout.write_all(response_json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        Ok(())
    }

    /// Turn one input line into the serialized response, if any
    async fn handle_line(&self, line: &str) -> Result<Option<String>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        debug!("Received request: {}", line);

        let response = match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => {
                // Notifications carry no id and get no reply
                if request.id.is_none() && request.method.starts_with("notifications/") {
                    debug!("Notification {}", request.method);
                    return Ok(None);
                }
                self.handle_request(&request).await
            }
            Err(e) => JsonRpcResponse::failure(
                None,
                JsonRpcError {
                    code: -32700,
                    message: format!("Parse error: {}", e),
                    data: None,
                },
            ),
        };

        let response_json = serde_json::to_string(&response)?;
        debug!("Sending response: {}", response_json);
        Ok(Some(response_json))
    }

    /// Handle a JSON-RPC request
    async fn handle_request(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let start = std::time::Instant::now();
        let method = &request.method;

        // Log incoming request (with tool name if it's a tool call)
        let request_desc = if method == "tools/call" {
            match request.params.as_ref().and_then(|p| p["name"].as_str()) {
                Some(tool_name) => format!("tools/call:{}", tool_name),
                None => "tools/call".to_string(),
            }
        } else {
            method.clone()
        };

        info!("→ {}", request_desc);

        let result = match method.as_str() {
            "initialize" => self.handle_initialize(),
            "initialized" => Ok(Value::Null),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => Ok(serde_json::json!({ "tools": get_tool_definitions() })),
            "tools/call" => self.handle_tools_call(&request.params).await,
            _ => Err(Error::McpProtocol(format!("Unknown method: {}", method))),
        };

        let elapsed_ms = start.elapsed().as_millis();

        match result {
            Ok(value) => {
                // Model round trips make most commands slow; only flag the outliers
                if elapsed_ms > 10_000 {
                    warn!("← {} OK ({}ms) SLOW", request_desc, elapsed_ms);
                } else {
                    info!("← {} OK ({}ms)", request_desc, elapsed_ms);
                }
                JsonRpcResponse::success(request.id.clone(), value)
            }
            Err(e) => {
                error!("← {} ERROR ({}ms): {}", request_desc, elapsed_ms, e);
                let code = match e {
                    Error::McpProtocol(_) => -32602,
                    Error::ToolNotFound(_) => -32601,
                    _ => -32000,
                };
                JsonRpcResponse::failure(
                    request.id.clone(),
                    JsonRpcError {
                        code,
                        message: e.to_string(),
                        data: Some(serde_json::json!({ "code": e.mcp_code() })),
                    },
                )
            }
        }
    }

    fn handle_initialize(&self) -> Result<Value> {
        Ok(serde_json::json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {
                "name": crate::APP_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {}
            }
        }))
    }

    async fn handle_tools_call(&self, params: &Option<Value>) -> Result<Value> {
        let params = params
            .as_ref()
            .ok_or_else(|| Error::McpProtocol("Missing params".to_string()))?;

        let name = params["name"]
            .as_str()
            .ok_or_else(|| Error::McpProtocol("Missing tool name".to_string()))?;

        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or(Value::Object(Default::default()));

        self.tools.execute(name, &arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::test_support::FakeLlm;
    use crate::processor::test_support::harness;
    use serde_json::json;

    fn server(llm: FakeLlm) -> McpServer {
        McpServer::new(Arc::new(harness(llm, vec![]).processor))
    }

    async fn call(server: &McpServer, request: Value) -> Value {
        let line = server
            .handle_line(&request.to_string())
            .await
            .unwrap()
            .expect("a response");
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let server = server(FakeLlm::new());

        let init = call(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})).await;
        assert_eq!(init["result"]["serverInfo"]["name"], "mailcmd");

        let tools = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        assert_eq!(tools["id"], 2);
        assert_eq!(tools["result"]["tools"][0]["name"], "process_command");
        assert_eq!(
            tools["result"]["tools"][0]["inputSchema"]["required"],
            json!(["command", "workspace_id", "user_id", "user_email"])
        );
    }

    #[tokio::test]
    async fn test_process_command_tool_returns_response_json() {
        let llm = FakeLlm::new().intent(json!({
            "action": "SEND_EMAIL",
            "parameters": {"to": ["john@example.com"], "subject": "Q3 budget", "body": "Numbers attached."}
        }));
        let server = server(llm);

        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0",
                "id": "a",
                "method": "tools/call",
                "params": {
                    "name": "process_command",
                    "arguments": {
                        "command": "Email john@example.com about the Q3 budget",
                        "workspace_id": "ws1",
                        "user_id": "user-1",
                        "user_email": "me@example.com"
                    }
                }
            }),
        )
        .await;

        assert!(response["result"].get("isError").is_none());
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["type"], "draft_email");
        assert_eq!(body["requiresConfirmation"], true);
        assert_eq!(body["draft"]["to"], json!(["john@example.com"]));
    }

    #[tokio::test]
    async fn test_errors_and_notifications() {
        let server = server(FakeLlm::new());

        let unknown = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
        )
        .await;
        assert_eq!(unknown["error"]["data"]["code"], "PROTOCOL_ERROR");

        let missing_tool = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(missing_tool["error"]["code"], -32601);

        let bad_args = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                   "params": {"name": "process_command", "arguments": {"command": "hi"}}}),
        )
        .await;
        assert_eq!(bad_args["error"]["code"], -32602);

        let garbage = server.handle_line("{not json").await.unwrap().unwrap();
        assert!(garbage.contains("-32700"));

        let notification = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(server.handle_line(&notification.to_string()).await.unwrap().is_none());
        assert!(server.handle_line("   ").await.unwrap().is_none());
    }
}
