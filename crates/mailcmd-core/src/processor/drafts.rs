//! Compose, reply and forward: build a draft, never touch the provider

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ActionHandler, Services};
use crate::error::{Error, Result};
use crate::llm::CompletionRequest;
use crate::models::{
    bare_address, CommandContext, CommandParams, CommandResponse, Draft, EmailRecord,
    ParsedCommand, ResponseKind,
};
use crate::search::{build_query, EmailQuery, Predicate};

const WRITER_PROMPT: &str = "You write short, clear, professional emails on behalf of the user. \
Reply with a JSON object {\"subject\": string, \"body\": string}. Sign off without inventing a name.";

#[derive(Debug, Deserialize)]
struct GeneratedEmail {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
}

/// Ask the model for a subject and body; `None` on any failure
async fn generate(services: &Services, instruction: String) -> Option<GeneratedEmail> {
    let request = CompletionRequest::new(WRITER_PROMPT, instruction).json();
    let completion = match services.llm.complete(request).await {
        Ok(completion) => completion,
        Err(e) => {
            warn!("Email generation failed: {}", e);
            return None;
        }
    };
    let content = completion.content?;
    match serde_json::from_str::<GeneratedEmail>(content.trim()) {
        Ok(email) if !email.subject.trim().is_empty() || !email.body.trim().is_empty() => {
            Some(email)
        }
        Ok(_) => None,
        Err(e) => {
            warn!("Generated email was not valid JSON: {}", e);
            None
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn prefixed_subject(prefix: &str, subject: &str) -> String {
    if subject
        .to_lowercase()
        .starts_with(&format!("{}:", prefix.to_lowercase()))
    {
        subject.to_string()
    } else {
        format!("{}: {}", prefix, subject)
    }
}

/// Resolve bare names to addresses of people who have emailed this workspace.
///
/// Returns the resolved list and the names that matched nobody.
pub(super) async fn resolve_recipients(
    services: &Services,
    context: &CommandContext,
    recipients: &[String],
) -> Result<(Vec<String>, Vec<String>)> {
    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();

    for recipient in recipients {
        if recipient.contains('@') {
            resolved.push(recipient.clone());
            continue;
        }

        let query = EmailQuery::new(1).and(Predicate::SenderContains(recipient.clone()));
        let matches = services.store.query(&context.workspace_id, &query).await?;
        match matches.first() {
            Some(email) => {
                let address = bare_address(&email.data.from);
                debug!("Resolved recipient '{}' to {}", recipient, address);
                resolved.push(address);
            }
            None => {
                resolved.push(recipient.clone());
                unresolved.push(recipient.clone());
            }
        }
    }

    Ok((resolved, unresolved))
}

fn unresolved_note(unresolved: &[String]) -> String {
    if unresolved.is_empty() {
        String::new()
    } else {
        format!(
            " I couldn't find an address for {}; please edit the recipients before sending.",
            unresolved.join(", ")
        )
    }
}

/// The email a reply or forward is about: `emailId` if given, else the newest match
async fn target_email(
    services: &Services,
    params: &CommandParams,
    context: &CommandContext,
) -> Result<EmailRecord> {
    if let Some(id) = non_empty(&params.email_id) {
        return services
            .store
            .get(&context.workspace_id, &id)
            .await?
            .ok_or_else(|| Error::EmailNotFound(id.clone()));
    }

    let mut filters = params.clone();
    filters.limit = Some(1);
    let query = build_query(&filters, context, &services.now(), services.config.search_limit);
    services
        .store
        .query(&context.workspace_id, &query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::EmailNotFound("no email matched the request".to_string()))
}

pub(super) struct ComposeHandler {
    pub services: Arc<Services>,
}

#[async_trait]
impl ActionHandler for ComposeHandler {
    fn name(&self) -> &'static str {
        "compose"
    }

    async fn handle(
        &self,
        command: &ParsedCommand,
        context: &CommandContext,
    ) -> Result<CommandResponse> {
        let params = &command.parameters;
        let (to, unresolved) = resolve_recipients(&self.services, context, &params.to).await?;
        let (cc, cc_unresolved) = resolve_recipients(&self.services, context, &params.cc).await?;
        let (bcc, bcc_unresolved) = resolve_recipients(&self.services, context, &params.bcc).await?;
        let unresolved: Vec<String> = unresolved
            .into_iter()
            .chain(cc_unresolved)
            .chain(bcc_unresolved)
            .collect();

        let subject = non_empty(&params.subject);
        let body = non_empty(&params.body);
        let topic = non_empty(&params.topic);

        let (subject, body) = match (subject, body) {
            (Some(subject), Some(body)) => (subject, body),
            (subject, body) => {
                let instruction = format!(
                    "Request: {}\nRecipients: {}\nTopic: {}\nSubject: {}\nBody notes: {}",
                    command.original_command,
                    to.join(", "),
                    topic.as_deref().unwrap_or("-"),
                    subject.as_deref().unwrap_or("-"),
                    body.as_deref().unwrap_or("-"),
                );
                let generated = generate(&self.services, instruction).await;
                let fallback_subject = subject
                    .clone()
                    .or_else(|| topic.as_deref().map(capitalize))
                    .unwrap_or_else(|| "(no subject)".to_string());
                let fallback_body = body.clone().unwrap_or_else(|| match &topic {
                    Some(topic) => {
                        format!("Hi,\n\nI wanted to reach out about {}.\n\nBest regards", topic)
                    }
                    None => String::new(),
                });

                match generated {
                    Some(generated) => (
                        subject.unwrap_or(if generated.subject.trim().is_empty() {
                            fallback_subject
                        } else {
                            generated.subject
                        }),
                        body.unwrap_or(if generated.body.trim().is_empty() {
                            fallback_body
                        } else {
                            generated.body
                        }),
                    ),
                    None => (fallback_subject, fallback_body),
                }
            }
        };

        let mut draft = Draft::new(to, subject, body);
        draft.cc = cc;
        draft.bcc = bcc;

        let message = if draft.to.is_empty() {
            "Here's a draft. Add at least one recipient before sending.".to_string()
        } else {
            format!(
                "Here's a draft to {}. Review it and confirm to send.{}",
                draft.to.join(", "),
                unresolved_note(&unresolved)
            )
        };

        Ok(CommandResponse::new(ResponseKind::DraftEmail, message).with_draft(draft))
    }
}

pub(super) struct ReplyHandler {
    pub services: Arc<Services>,
}

#[async_trait]
impl ActionHandler for ReplyHandler {
    fn name(&self) -> &'static str {
        "reply"
    }

    async fn handle(
        &self,
        command: &ParsedCommand,
        context: &CommandContext,
    ) -> Result<CommandResponse> {
        let params = &command.parameters;
        let original = target_email(&self.services, params, context).await?;

        // Replying to our own message goes back to its recipients
        let to = if original.is_from(&context.user_email) {
            original.data.to.clone()
        } else {
            vec![original.data.from.clone()]
        };
        let subject = prefixed_subject("Re", &original.data.subject);

        let intent = non_empty(&params.reply_intent).or_else(|| non_empty(&params.body));
        let instruction = format!(
            "Write a reply to this email.\nWhat the reply should say: {}\n\nFrom: {}\nSubject: {}\n\n{}",
            intent.as_deref().unwrap_or("a brief, polite acknowledgement"),
            original.data.from,
            original.data.subject,
            original.body_text().chars().take(3000).collect::<String>()
        );
        let body = match generate(&self.services, instruction).await {
            Some(generated) if !generated.body.trim().is_empty() => generated.body,
            _ => intent.unwrap_or_default(),
        };

        let mut draft = Draft::new(to, subject, body);
        draft.in_reply_to = Some(original.data.message_id.clone());
        draft.thread_id = Some(original.data.thread_id.clone()).filter(|t| !t.is_empty());
        draft.original_email_id = Some(original.id.clone());

        let message = format!(
            "Here's a reply to \"{}\". Review it and confirm to send.",
            original.data.subject
        );
        Ok(CommandResponse::new(ResponseKind::DraftReply, message)
            .with_draft(draft)
            .with_emails(std::slice::from_ref(&original)))
    }
}

pub(super) struct ForwardHandler {
    pub services: Arc<Services>,
}

#[async_trait]
impl ActionHandler for ForwardHandler {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn handle(
        &self,
        command: &ParsedCommand,
        context: &CommandContext,
    ) -> Result<CommandResponse> {
        let params = &command.parameters;
        let original = target_email(&self.services, params, context).await?;

        let (to, unresolved) = resolve_recipients(&self.services, context, &params.to).await?;
        let subject = prefixed_subject("Fwd", &original.data.subject);
        let note = non_empty(&params.body).unwrap_or_default();

        let mut draft = Draft::new(to, subject, note);
        draft.cc = params.cc.clone();
        draft.original_email_id = Some(original.id.clone());

        let message = format!(
            "Ready to forward \"{}\" from {}{}. The original message will be included below your note.{}",
            original.data.subject,
            original.data.from,
            if draft.to.is_empty() {
                String::new()
            } else {
                format!(" to {}", draft.to.join(", "))
            },
            unresolved_note(&unresolved)
        );
        Ok(CommandResponse::new(ResponseKind::ForwardEmail, message)
            .with_draft(draft)
            .with_emails(std::slice::from_ref(&original)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::intent::test_support::FakeLlm;
    use crate::llm::Completion;
    use crate::models::{DraftKind, ResponseKind};
    use crate::search::test_support::email;
    use chrono::Duration;
    use serde_json::json;

    #[tokio::test]
    async fn test_names_resolve_against_senders() {
        let now = fixed_now();
        let john = email(
            "ws1",
            "John Smith <john.smith@acme.com>",
            "Hello",
            "",
            now - Duration::days(2),
        );
        let llm = FakeLlm::new()
            .intent(json!({
                "action": "SEND_EMAIL",
                "parameters": {"to": ["john", "zed"], "subject": "Lunch", "body": "Tomorrow?"}
            }));
        let h = harness(llm, vec![john]);

        let response = h
            .processor
            .process_command("email john and zed about lunch", &context(), None)
            .await;
        let draft = response.draft.unwrap();
        assert_eq!(draft.to, vec!["john.smith@acme.com", "zed"]);
        assert!(response.message.contains("zed"));
        // Subject and body were given, so no generation call
        assert_eq!(h.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_reply_draft_targets_sender_and_thread() {
        let now = fixed_now();
        let mut original = email(
            "ws1",
            "Alice <alice@example.com>",
            "Plan",
            "Thoughts?",
            now - Duration::hours(3),
        );
        original.data.thread_id = "t-1".into();
        original.data.message_id = "gm-1".into();
        let llm = FakeLlm::new()
            .intent(json!({
                "action": "DRAFT_REPLY",
                "parameters": {"emailId": original.id, "replyIntent": "say yes"}
            }))
            .reply(Completion::text(r#"{"subject": "", "body": "Yes, works for me."}"#));
        let h = harness(llm, vec![original.clone()]);

        let response = h.processor.process_command("reply yes", &context(), None).await;
        assert_eq!(response.kind, ResponseKind::DraftReply);
        assert!(response.requires_confirmation());
        let draft = response.draft.unwrap();
        assert_eq!(draft.kind(), DraftKind::Reply);
        assert_eq!(draft.to, vec!["Alice <alice@example.com>"]);
        assert_eq!(draft.subject, "Re: Plan");
        assert_eq!(draft.body, "Yes, works for me.");
        assert_eq!(draft.thread_id.as_deref(), Some("t-1"));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reply_to_missing_email_is_not_found() {
        let llm = FakeLlm::new().intent(json!({
            "action": "DRAFT_REPLY",
            "parameters": {"emailId": "nope"}
        }));
        let h = harness(llm, vec![]);
        let response = h.processor.process_command("reply", &context(), None).await;
        assert_eq!(response.kind, ResponseKind::Error);
        assert_eq!(response.message, "Email not found.");
    }

    #[tokio::test]
    async fn test_forward_draft() {
        let now = fixed_now();
        let original = email(
            "ws1",
            "alice@example.com",
            "Contract",
            "Sign please",
            now - Duration::hours(1),
        );
        let llm = FakeLlm::new().intent(json!({
            "action": "FORWARD",
            "parameters": {"to": ["bob@example.com"], "from": "alice", "body": "FYI"}
        }));
        let h = harness(llm, vec![original.clone()]);

        let response = h
            .processor
            .process_command("forward alice's email to bob", &context(), None)
            .await;
        assert_eq!(response.kind, ResponseKind::ForwardEmail);
        let draft = response.draft.unwrap();
        assert_eq!(draft.kind(), DraftKind::Forward);
        assert_eq!(draft.subject, "Fwd: Contract");
        assert_eq!(draft.original_email_id.as_deref(), Some(original.id.as_str()));
        assert_eq!(h.transport.call_count(), 0);
    }
}
