//! Hosted language-model completion service
//!
//! Everything that talks to a model goes through [`CompletionService`], so
//! tests can swap in a scripted fake.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// One completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// System instruction
    pub system: String,

    /// User turn
    pub user: String,

    /// Function tools in OpenAI format
    pub tools: Vec<Value>,

    /// Name of the tool the model must call
    pub tool_choice: Option<String>,

    /// Ask for a JSON object instead of free text
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    /// Force a call to `tool`
    pub fn with_tool(mut self, tool: Value) -> Self {
        let name = tool["function"]["name"].as_str().map(str::to_string);
        self.tools.push(tool);
        self.tool_choice = name;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// A function call returned by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,

    /// Raw JSON arguments, as produced by the model
    pub arguments: String,
}

/// Model output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_call: Option<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_call: None,
        }
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;
}

/// OpenAI-compatible `chat/completions` client
pub struct OpenAiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiClient {
    /// Build from config; the API key is read from `api_key_env`
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::Config(format!(
                "Missing completion API key: set {}",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user }
            ]
        });

        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
        }
        if let Some(name) = &request.tool_choice {
            body["tool_choice"] = json!({ "type": "function", "function": { "name": name } });
        }
        if request.json_response {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }
}

/// Pull text content and the first tool call out of a chat completion
fn parse_completion(json: &Value) -> Completion {
    let message = &json["choices"][0]["message"];
    let content = message["content"].as_str().map(str::to_string);
    let tool_call = message["tool_calls"]
        .as_array()
        .and_then(|calls| calls.first())
        .and_then(|call| {
            Some(ToolCall {
                name: call["function"]["name"].as_str()?.to_string(),
                arguments: call["function"]["arguments"].as_str()?.to_string(),
            })
        });
    Completion { content, tool_call }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!("Completion request to {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| Error::Parse(format!("completion request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Completion API error {}: {}", status, body);
            return Err(Error::Parse(format!("completion API returned {}", status)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Parse(format!("invalid completion response: {}", e)))?;
        Ok(parse_completion(&json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient {
            client: Client::new(),
            api_base: "http://localhost".to_string(),
            api_key: "k".to_string(),
            model: "test-model".to_string(),
            temperature: 0.2,
        }
    }

    #[test]
    fn test_request_body_forces_tool() {
        let tool = json!({"type": "function", "function": {"name": "do_it", "parameters": {}}});
        let request = CompletionRequest::new("sys", "hello").with_tool(tool);
        let body = client().request_body(&request);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["tool_choice"]["function"]["name"], "do_it");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_json_mode() {
        let body = client().request_body(&CompletionRequest::new("s", "u").json());
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_completion_tool_call() {
        let completion = parse_completion(&json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "type": "function",
                        "function": {"name": "do_it", "arguments": "{\"a\":1}"}
                    }]
                }
            }]
        }));
        assert_eq!(completion.content, None);
        assert_eq!(completion.tool_call.unwrap().arguments, "{\"a\":1}");
    }

    #[test]
    fn test_parse_completion_text() {
        let completion = parse_completion(&json!({
            "choices": [{"message": {"content": "hi"}}]
        }));
        assert_eq!(completion.content.as_deref(), Some("hi"));
        assert!(completion.tool_call.is_none());

        assert_eq!(parse_completion(&json!({})), Completion::default());
    }
}
