//! Mail provider adapter
//!
//! [`MailAdapter`] is created per command for one `(workspace, user)` pair. It
//! resolves credentials lazily, renders MIME, talks to the remote API through
//! [`MailTransport`] and keeps the local index in step with what it did.

mod gmail;
pub mod mime;

pub use gmail::GmailTransport;
pub use mime::{build_mime_message, escape_html, text_to_html, OutgoingMessage};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{
    labels, CommandContext, Draft, EmailBody, EmailData, EmailRecord, RecordMetadata,
    SOURCE_COMMAND_PROCESSOR,
};
use crate::oauth::OAuthManager;
use crate::store::EmailStore;

/// Banner placed between the forwarding note and the original message
pub const FORWARD_BANNER: &str = "---------- Forwarded message ---------";

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Provider ids of a sent message
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub id: String,
    pub thread_id: String,
}

/// Remote mail API, addressed with an already-resolved access token
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send an url-safe-base64 message
    async fn send_raw(
        &self,
        token: &str,
        raw: &str,
        thread_id: Option<&str>,
    ) -> Result<SentMessage>;

    /// Save a provider-side draft, returning its id
    async fn create_draft(&self, token: &str, raw: &str, thread_id: Option<&str>) -> Result<String>;

    /// Fetch the full RFC 2822 bytes of a message
    async fn get_raw(&self, token: &str, message_id: &str) -> Result<Vec<u8>>;

    async fn modify_labels(
        &self,
        token: &str,
        message_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> Result<()>;

    async fn trash(&self, token: &str, message_id: &str) -> Result<()>;
}

/// Per-command mail operations for one user
pub struct MailAdapter {
    context: CommandContext,
    transport: Arc<dyn MailTransport>,
    store: Arc<dyn EmailStore>,
    oauth: Arc<OAuthManager>,
    token: Mutex<Option<String>>,
    clock: Clock,
}

impl MailAdapter {
    pub fn new(
        context: CommandContext,
        transport: Arc<dyn MailTransport>,
        store: Arc<dyn EmailStore>,
        oauth: Arc<OAuthManager>,
    ) -> Self {
        Self {
            context,
            transport,
            store,
            oauth,
            token: Mutex::new(None),
            clock: Arc::new(Utc::now),
        }
    }

    /// Timestamp mirrored records with `clock` instead of the system time
    pub fn with_clock(self, clock: Clock) -> Self {
        Self { clock, ..self }
    }

    /// Use a caller-supplied access token instead of the stored credentials
    pub fn with_access_token(self, token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
            ..self
        }
    }

    /// Resolve the access token once and reuse it for the adapter's lifetime
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let token = self
            .oauth
            .get_valid_token(&self.context.workspace_id, &self.context.user_id)
            .await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    fn outgoing(&self, draft: &Draft) -> OutgoingMessage {
        OutgoingMessage {
            from: Some(self.context.user_email.clone()).filter(|e| !e.is_empty()),
            to: draft.to.clone(),
            cc: draft.cc.clone(),
            bcc: draft.bcc.clone(),
            subject: draft.subject.clone(),
            body: draft.body.clone(),
            ..Default::default()
        }
    }

    /// Send a new message and mirror it into the index
    pub async fn send_email(&self, draft: &Draft) -> Result<SentMessage> {
        let message = self.outgoing(draft);
        self.send(&message, None).await
    }

    /// Save a provider-side draft without sending
    pub async fn create_draft(&self, draft: &Draft) -> Result<String> {
        let token = self.access_token().await?;
        let message = self.outgoing(draft);
        let raw = mime::encode_raw(&build_mime_message(&message));
        self.transport
            .create_draft(&token, &raw, draft.thread_id.as_deref())
            .await
    }

    /// Send a reply threaded under the original message
    pub async fn reply_to_email(&self, draft: &Draft) -> Result<SentMessage> {
        let token = self.access_token().await?;
        let mut message = self.outgoing(draft);

        if let Some(original_id) = draft.in_reply_to.as_deref().filter(|id| !id.is_empty()) {
            let header_id = if original_id.starts_with('<') {
                Some(original_id.to_string())
            } else {
                // Index ids are provider ids; the RFC Message-ID lives in the raw message
                match self.transport.get_raw(&token, original_id).await {
                    Ok(raw) => mime::parse_message(&raw).ok().and_then(|m| m.message_id),
                    Err(e) => {
                        warn!("Could not fetch {} for reply headers: {}", original_id, e);
                        None
                    }
                }
            };
            message.in_reply_to = header_id.clone();
            message.references = header_id;
        }

        let thread_id = draft.thread_id.as_deref().filter(|t| !t.is_empty());
        self.send(&message, thread_id).await
    }

    /// Forward an indexed email with the draft's note above the original
    pub async fn forward_email(&self, draft: &Draft) -> Result<SentMessage> {
        let original_id = draft
            .original_email_id
            .as_deref()
            .ok_or_else(|| Error::Validation("No email selected to forward.".to_string()))?;
        let original = self
            .store
            .get(&self.context.workspace_id, original_id)
            .await?
            .ok_or_else(|| Error::EmailNotFound(original_id.to_string()))?;

        let token = self.access_token().await?;
        let parsed = if original.data.message_id.is_empty() {
            None
        } else {
            let raw = self
                .transport
                .get_raw(&token, &original.data.message_id)
                .await?;
            Some(mime::parse_message(&raw)?)
        };
        let forwarded = parsed.unwrap_or_else(|| mime::ParsedMessage {
            from: original.data.from.clone(),
            to: original.data.to.clone(),
            cc: original.data.cc.clone(),
            date: Some(original.data.sent_at.to_rfc2822()),
            subject: original.data.subject.clone(),
            body_text: original.body_text().to_string(),
            message_id: None,
        });

        let mut message = self.outgoing(draft);
        message.body = forward_body(&draft.body, &forwarded);
        self.send(&message, None).await
    }

    async fn send(
        &self,
        message: &OutgoingMessage,
        thread_id: Option<&str>,
    ) -> Result<SentMessage> {
        let token = self.access_token().await?;
        let raw = mime::encode_raw(&build_mime_message(message));
        let sent = self.transport.send_raw(&token, &raw, thread_id).await?;
        self.mirror_sent(message, &sent).await;
        Ok(sent)
    }

    /// Record a sent message in the index.
    ///
    /// The message is already out; a store failure is logged, not returned.
    async fn mirror_sent(&self, message: &OutgoingMessage, sent: &SentMessage) {
        let now = (self.clock)();
        let data = EmailData {
            message_id: sent.id.clone(),
            thread_id: sent.thread_id.clone(),
            from: self.context.user_email.clone(),
            to: message.to.clone(),
            cc: message.cc.clone(),
            bcc: message.bcc.clone(),
            subject: message.subject.clone(),
            body: EmailBody::from_text(message.body.clone()),
            sent_at: now,
            is_read: true,
            is_starred: false,
            is_important: false,
            attachments: Vec::new(),
            labels: vec![labels::SENT.to_string()],
        };
        let mut record = EmailRecord::new(
            self.context.workspace_id.clone(),
            data,
            RecordMetadata {
                source: SOURCE_COMMAND_PROCESSOR.to_string(),
                created_by: self.context.user_id.clone(),
            },
        );
        record.created_at = now;

        let id = record.id.clone();
        match self.store.insert(record).await {
            Ok(()) => debug!("Mirrored sent message {} as {}", sent.id, id),
            Err(e) => error!("Failed to mirror sent message {}: {}", sent.id, e),
        }
    }

    async fn modify(&self, record: &EmailRecord, add: &[&str], remove: &[&str]) -> Result<()> {
        let token = self.access_token().await?;
        self.transport
            .modify_labels(&token, &record.data.message_id, add, remove)
            .await
    }

    /// Move to trash remotely and tag the record `TRASH`
    pub async fn delete_email(&self, record: &mut EmailRecord) -> Result<()> {
        let token = self.access_token().await?;
        self.transport.trash(&token, &record.data.message_id).await?;
        record.add_label(labels::TRASH);
        record.remove_label(labels::INBOX);
        self.store.update(record).await
    }

    pub async fn mark_as_read(&self, record: &mut EmailRecord, read: bool) -> Result<()> {
        if read {
            self.modify(record, &[], &[labels::UNREAD]).await?;
            record.remove_label(labels::UNREAD);
        } else {
            self.modify(record, &[labels::UNREAD], &[]).await?;
            record.add_label(labels::UNREAD);
        }
        record.data.is_read = read;
        self.store.update(record).await
    }

    pub async fn star_email(&self, record: &mut EmailRecord, starred: bool) -> Result<()> {
        if starred {
            self.modify(record, &[labels::STARRED], &[]).await?;
            record.add_label(labels::STARRED);
        } else {
            self.modify(record, &[], &[labels::STARRED]).await?;
            record.remove_label(labels::STARRED);
        }
        record.data.is_starred = starred;
        self.store.update(record).await
    }

    /// Remove `INBOX` remotely; locally the record is tagged `ARCHIVED`
    pub async fn archive_email(&self, record: &mut EmailRecord) -> Result<()> {
        self.modify(record, &[], &[labels::INBOX]).await?;
        record.remove_label(labels::INBOX);
        record.add_label(labels::ARCHIVED);
        self.store.update(record).await?;
        info!("Archived {}", record.id);
        Ok(())
    }
}

/// Note, banner, original headers, original body
fn forward_body(note: &str, original: &mime::ParsedMessage) -> String {
    let mut body = String::new();
    if !note.trim().is_empty() {
        body.push_str(note.trim_end());
        body.push_str("\n\n");
    }
    body.push_str(FORWARD_BANNER);
    body.push('\n');
    body.push_str(&format!("From: {}\n", original.from));
    if let Some(date) = &original.date {
        body.push_str(&format!("Date: {}\n", date));
    }
    body.push_str(&format!("Subject: {}\n", original.subject));
    body.push_str(&format!("To: {}\n", original.to.join(", ")));
    if !original.cc.is_empty() {
        body.push_str(&format!("Cc: {}\n", original.cc.join(", ")));
    }
    body.push('\n');
    body.push_str(&original.body_text);
    body
}
