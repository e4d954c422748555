//! Free text to [`ParsedCommand`] via a forced function call

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::Result;
use crate::llm::{CompletionRequest, CompletionService};
use crate::models::{ActionKind, CommandParams, ParsedCommand};

/// Name of the function the model is forced to call
pub const INTENT_FUNCTION: &str = "process_email_command";

const SYSTEM_PROMPT: &str = "You turn a user's request about their mailbox into a structured command. \
Always call process_email_command exactly once.\n\n\
Actions:\n\
- SEND_EMAIL / COMPOSE: write a new email. Put addresses or names in `to`, and use `subject`, `body` or `topic`.\n\
- SEARCH_EMAILS / SHOW_EMAILS: find or list emails using the search filters.\n\
- SUMMARIZE: summarize the emails matching the filters.\n\
- DRAFT_REPLY: reply to one email (`emailId`) or the newest match; describe the reply in `replyIntent`.\n\
- FORWARD: forward an email to `to`.\n\
- BULK_ACTION / QUICK_ACTION: apply `bulkAction` (archive, delete, mark_read, mark_unread, star, unstar) to every match.\n\
- EXTRACT_INFO: pull `extractionType` (action_items, email_addresses, phone_numbers, meeting_requests, commitments) out of matching emails.\n\
- ANALYZE: run `analysisType` (needs_response, urgent, sentiment, commitments) over matching emails.\n\
- UNKNOWN: the request is not about email.\n\n\
Date phrases go in `dateRange` verbatim (e.g. \"today\", \"yesterday\", \"this week\", \"last month\", \"last 3 days\"). \
\"Unread\" means isRead=false. Only set filters the user actually asked for.";

/// Build the function tool enumerating every action and parameter
pub fn function_schema() -> Value {
    let actions: Vec<&str> = ActionKind::ALL.iter().map(ActionKind::as_str).collect();
    let recipients = json!({
        "type": "array",
        "items": { "type": "string" },
        "description": "Email addresses or contact names"
    });

    json!({
        "type": "function",
        "function": {
            "name": INTENT_FUNCTION,
            "description": "Record the structured form of an email command",
            "parameters": {
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": actions,
                        "description": "What the user wants to do"
                    },
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "to": recipients.clone(),
                            "cc": recipients.clone(),
                            "bcc": recipients,
                            "subject": { "type": "string" },
                            "body": { "type": "string" },
                            "topic": {
                                "type": "string",
                                "description": "What the email is about, when no exact subject or body was given"
                            },
                            "from": { "type": "string", "description": "Sender name or address to filter by" },
                            "searchQuery": { "type": "string", "description": "Text to find in subject or body" },
                            "dateRange": { "type": "string", "description": "Relative date phrase" },
                            "isRead": { "type": "boolean" },
                            "hasAttachments": { "type": "boolean" },
                            "isImportant": { "type": "boolean" },
                            "isStarred": { "type": "boolean" },
                            "needsResponse": { "type": "boolean" },
                            "limit": { "type": "integer", "minimum": 1 },
                            "bulkAction": {
                                "type": "string",
                                "enum": ["archive", "delete", "mark_read", "mark_unread", "star", "unstar"]
                            },
                            "emailId": { "type": "string" },
                            "extractionType": {
                                "type": "string",
                                "enum": ["action_items", "email_addresses", "phone_numbers", "meeting_requests", "commitments"]
                            },
                            "analysisType": {
                                "type": "string",
                                "enum": ["needs_response", "urgent", "sentiment", "commitments"]
                            },
                            "replyIntent": { "type": "string", "description": "What the reply should say" }
                        }
                    }
                },
                "required": ["action"]
            }
        }
    })
}

/// Classifies commands with the completion service
pub struct IntentParser {
    llm: Arc<dyn CompletionService>,
}

impl IntentParser {
    pub fn new(llm: Arc<dyn CompletionService>) -> Self {
        Self { llm }
    }

    /// Parse one command.
    ///
    /// A missing or malformed function call yields `UNKNOWN`; only transport
    /// failures are errors.
    pub async fn parse(&self, command: &str) -> Result<ParsedCommand> {
        let request = CompletionRequest::new(SYSTEM_PROMPT, command).with_tool(function_schema());
        let completion = self.llm.complete(request).await?;

        let Some(call) = completion.tool_call else {
            warn!("Completion returned no function call for command");
            return Ok(ParsedCommand::unknown(command));
        };
        if call.name != INTENT_FUNCTION {
            warn!("Completion called unexpected function {}", call.name);
            return Ok(ParsedCommand::unknown(command));
        }

        Ok(interpret_arguments(&call.arguments, command))
    }
}

fn interpret_arguments(arguments: &str, command: &str) -> ParsedCommand {
    let value: Value = match serde_json::from_str(arguments) {
        Ok(value) => value,
        Err(e) => {
            warn!("Malformed function arguments: {}", e);
            return ParsedCommand::unknown(command);
        }
    };

    let action = value
        .get("action")
        .cloned()
        .and_then(|a| serde_json::from_value::<ActionKind>(a).ok())
        .unwrap_or(ActionKind::Unknown);

    let parameters = match value.get("parameters") {
        Some(Value::Null) | None => CommandParams::default(),
        Some(params) => serde_json::from_value(params.clone()).unwrap_or_else(|e| {
            warn!("Dropping malformed parameters for {}: {}", action, e);
            CommandParams::default()
        }),
    };

    debug!("Parsed command as {}", action);
    ParsedCommand {
        action,
        parameters,
        original_command: command.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::INTENT_FUNCTION;
    use crate::error::{Error, Result};
    use crate::llm::{Completion, CompletionRequest, CompletionService, ToolCall};

    /// Scripted completion service: replies are popped in order, requests are recorded
    #[derive(Default)]
    pub struct FakeLlm {
        replies: Mutex<Vec<Result<Completion>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeLlm {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, completion: Completion) -> Self {
            self.replies.lock().push(Ok(completion));
            self
        }

        /// Queue a forced intent call
        pub fn intent(self, arguments: serde_json::Value) -> Self {
            self.reply(Completion {
                content: None,
                tool_call: Some(ToolCall {
                    name: INTENT_FUNCTION.to_string(),
                    arguments: arguments.to_string(),
                }),
            })
        }

        pub fn fail(self, err: Error) -> Self {
            self.replies.lock().push(Err(err));
            self
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl CompletionService for FakeLlm {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.requests.lock().push(request);
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                return Ok(Completion::default());
            }
            replies.remove(0)
        }
    }
}
