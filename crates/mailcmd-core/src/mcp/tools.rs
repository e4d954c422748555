//! MCP tool implementations

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::protocol::{ToolDefinition, ToolResult};
use crate::error::{Error, Result};
use crate::models::{CommandContext, Confirmation, ResponseKind};
use crate::processor::CommandProcessor;

/// Get all tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        name: "process_command".to_string(),
        description: "Run a natural-language mailbox command (search, summarize, compose, reply, \
            forward, bulk archive/delete/star, extract, analyze). Drafts come back with \
            requiresConfirmation=true; resubmit the draft with a confirmation to send, save or \
            cancel it."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "What the user asked for, e.g. 'archive emails from yesterday'"
                },
                "workspace_id": {
                    "type": "string",
                    "description": "Workspace that owns the mailbox"
                },
                "user_id": {
                    "type": "string",
                    "description": "User whose mail account is used"
                },
                "user_email": {
                    "type": "string",
                    "description": "The user's own email address"
                },
                "confirmation": {
                    "type": "object",
                    "description": "Act on a previously returned draft instead of parsing the command",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": ["send", "save_draft", "cancel"]
                        },
                        "draft": {
                            "type": "object",
                            "description": "The draft exactly as returned, optionally edited"
                        }
                    },
                    "required": ["action", "draft"]
                }
            },
            "required": ["command", "workspace_id", "user_id", "user_email"]
        }),
    }]
}

#[derive(Debug, Deserialize)]
struct ProcessCommandArgs {
    #[serde(default)]
    command: String,
    workspace_id: String,
    user_id: String,
    user_email: String,
    #[serde(default)]
    confirmation: Option<Confirmation>,
}

/// Tool handler
pub struct ToolHandler {
    processor: Arc<CommandProcessor>,
}

impl ToolHandler {
    pub fn new(processor: Arc<CommandProcessor>) -> Self {
        Self { processor }
    }

    /// Execute a tool
    pub async fn execute(&self, name: &str, arguments: &Value) -> Result<Value> {
        debug!("Executing tool: {} with args: {:?}", name, arguments);

        let result = match name {
            "process_command" => self.process_command(arguments).await,
            _ => Err(Error::ToolNotFound(name.to_string())),
        }?;

        Ok(serde_json::to_value(result)?)
    }

    async fn process_command(&self, arguments: &Value) -> Result<ToolResult> {
        let args: ProcessCommandArgs = serde_json::from_value(arguments.clone())
            .map_err(|e| Error::McpProtocol(format!("Invalid process_command arguments: {}", e)))?;

        if args.command.trim().is_empty() && args.confirmation.is_none() {
            return Err(Error::McpProtocol(
                "Either a command or a confirmation is required".to_string(),
            ));
        }

        let context = CommandContext::new(args.workspace_id, args.user_id, args.user_email);
        let response = self
            .processor
            .process_command(&args.command, &context, args.confirmation)
            .await;

        let value = serde_json::to_value(&response)?;
        Ok(ToolResult::json(&value, response.kind == ResponseKind::Error))
    }
}
