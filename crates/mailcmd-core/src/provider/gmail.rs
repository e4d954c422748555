//! Gmail REST v1 transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

use super::mime::decode_raw;
use super::{MailTransport, SentMessage};

/// Gmail API client; one per process, tokens are passed per call
pub struct GmailTransport {
    client: Client,
    api_base: String,
}

impl GmailTransport {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    /// Fail on non-2xx, logging the provider body
    async fn check(response: Response, what: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Gmail API error {} while {}: {}", status, what, body);
        Err(Error::Provider {
            status: status.as_u16(),
            body,
        })
    }

    fn sent_message(json: &Value) -> Result<SentMessage> {
        let id = json["id"]
            .as_str()
            .ok_or_else(|| Error::ProviderResponse("missing message id".to_string()))?;
        Ok(SentMessage {
            id: id.to_string(),
            thread_id: json["threadId"].as_str().unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn send_raw(
        &self,
        token: &str,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<SentMessage> {
        let mut body = json!({ "raw": raw });
        if let Some(thread_id) = thread_id {
            body["threadId"] = json!(thread_id);
        }

        let response = self
            .client
            .post(self.url("messages/send"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let json: Value = Self::check(response, "sending message").await?.json().await?;
        let sent = Self::sent_message(&json)?;

        info!("Email sent successfully: {}", sent.id);
        Ok(sent)
    }

    async fn create_draft(
        &self,
        token: &str,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<String> {
        let mut message = json!({ "raw": raw });
        if let Some(thread_id) = thread_id {
            message["threadId"] = json!(thread_id);
        }

        let response = self
            .client
            .post(self.url("drafts"))
            .bearer_auth(token)
            .json(&json!({ "message": message }))
            .send()
            .await?;
        let json: Value = Self::check(response, "creating draft").await?.json().await?;
        let draft_id = json["id"]
            .as_str()
            .ok_or_else(|| Error::ProviderResponse("missing draft id".to_string()))?
            .to_string();

        info!("Draft created successfully: {}", draft_id);
        Ok(draft_id)
    }

    async fn get_raw(&self, token: &str, message_id: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url(&format!("messages/{}", message_id)))
            .query(&[("format", "raw")])
            .bearer_auth(token)
            .send()
            .await?;
        let json: Value = Self::check(response, "fetching message").await?.json().await?;
        let raw = json["raw"]
            .as_str()
            .ok_or_else(|| Error::ProviderResponse("missing raw message".to_string()))?;

        debug!("Fetched raw message {}", message_id);
        decode_raw(raw)
    }

    async fn modify_labels(
        &self,
        token: &str,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("messages/{}/modify", message_id)))
            .bearer_auth(token)
            .json(&json!({ "addLabelIds": add, "removeLabelIds": remove }))
            .send()
            .await?;
        Self::check(response, "modifying labels").await?;

        debug!("Modified labels on {}: +{:?} -{:?}", message_id, add, remove);
        Ok(())
    }

    async fn trash(&self, token: &str, message_id: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("messages/{}/trash", message_id)))
            .bearer_auth(token)
            .send()
            .await?;
        Self::check(response, "trashing message").await?;

        debug!("Trashed message {}", message_id);
        Ok(())
    }
}
