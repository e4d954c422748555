//! RFC 2822 message construction and parsing

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};

use crate::error::{Error, Result};

/// Everything needed to render one outgoing message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,

    /// HTML rendition; derived from `body` when absent
    pub body_html: Option<String>,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Plain text to an HTML fragment: escaped, newlines as `<br>`, tabs as four `&nbsp;`
pub fn text_to_html(text: &str) -> String {
    escape_html(text)
        .replace("\r\n", "\n")
        .replace('\n', "<br>\n")
        .replace('\t', "&nbsp;&nbsp;&nbsp;&nbsp;")
}

/// Collapse line breaks in a header value so it stays on one header line
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Encode a header value for RFC 2047 when it is not plain ASCII.
///
/// Line breaks never survive into the header.
pub fn encode_header(value: &str) -> String {
    let value = single_line(value);
    if value.is_ascii() {
        return value;
    }
    format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
}

fn address_list(addresses: &[String]) -> String {
    addresses
        .iter()
        .map(|a| single_line(a))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Base64 body with 76-column lines
fn encode_body(body: &str) -> String {
    let encoded = STANDARD.encode(body.as_bytes());
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 76 * 2);
    for (i, chunk) in encoded.as_bytes().chunks(76).enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        // base64 output is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    out
}

/// Render a `multipart/alternative` message with text and HTML parts
pub fn build_mime_message(message: &OutgoingMessage) -> String {
    let boundary = format!(
        "----=_Part_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    );

    let mut out = String::new();
    if let Some(from) = &message.from {
        out.push_str(&format!("From: {}\r\n", single_line(from)));
    }
    out.push_str(&format!("To: {}\r\n", address_list(&message.to)));
    if !message.cc.is_empty() {
        out.push_str(&format!("Cc: {}\r\n", address_list(&message.cc)));
    }
    if !message.bcc.is_empty() {
        out.push_str(&format!("Bcc: {}\r\n", address_list(&message.bcc)));
    }
    if let Some(reply_to) = &message.reply_to {
        out.push_str(&format!("Reply-To: {}\r\n", single_line(reply_to)));
    }
    if let Some(in_reply_to) = &message.in_reply_to {
        out.push_str(&format!("In-Reply-To: {}\r\n", single_line(in_reply_to)));
    }
    if let Some(references) = &message.references {
        out.push_str(&format!("References: {}\r\n", single_line(references)));
    }
    out.push_str(&format!("Subject: {}\r\n", encode_header(&message.subject)));
    out.push_str("MIME-Version: 1.0\r\n");
    out.push_str(&format!(
        "Content-Type: multipart/alternative; boundary=\"{}\"\r\n\r\n",
        boundary
    ));

    let html = message
        .body_html
        .clone()
        .unwrap_or_else(|| text_to_html(&message.body));

    let parts = [("text/plain", message.body.as_str()), ("text/html", html.as_str())];
    for (content_type, content) in parts {
        out.push_str(&format!("--{}\r\n", boundary));
        out.push_str(&format!("Content-Type: {}; charset=utf-8\r\n", content_type));
        out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
        out.push_str(&encode_body(content));
        out.push_str("\r\n");
    }
    out.push_str(&format!("--{}--\r\n", boundary));
    out
}

/// URL-safe base64 for the provider's `raw` field
pub fn encode_raw(message: &str) -> String {
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

/// Decode a provider `raw` field (padding tolerated)
pub fn decode_raw(raw: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(raw.trim().trim_end_matches('='))
        .map_err(|e| Error::ProviderResponse(format!("Invalid raw message encoding: {}", e)))
}

/// Headers and text of a fetched message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMessage {
    pub message_id: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub date: Option<String>,
    pub subject: String,
    pub body_text: String,
}

fn format_addresses(address: Option<&mail_parser::Address>) -> Vec<String> {
    address
        .map(|addrs| {
            addrs
                .iter()
                .filter_map(|addr| {
                    let email = addr.address()?;
                    Some(match addr.name() {
                        Some(name) if !name.is_empty() => format!("{} <{}>", name, email),
                        _ => email.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a raw RFC 2822 message
pub fn parse_message(raw: &[u8]) -> Result<ParsedMessage> {
    let parsed = mail_parser::MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::ProviderResponse("Failed to parse email".to_string()))?;

    Ok(ParsedMessage {
        message_id: parsed.message_id().map(|id| format!("<{}>", id)),
        from: format_addresses(parsed.from()).into_iter().next().unwrap_or_default(),
        to: format_addresses(parsed.to()),
        cc: format_addresses(parsed.cc()),
        date: parsed.date().map(|d| d.to_rfc822()),
        subject: parsed.subject().unwrap_or_default().to_string(),
        body_text: parsed
            .body_text(0)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    })
}
