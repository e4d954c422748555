//! Error types for mailcmd

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using mailcmd's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mailcmd
#[derive(Error, Debug)]
pub enum Error {
    // Intent parsing errors
    #[error("Command parse failed: {0}")]
    Parse(String),

    // Data errors
    #[error("Email not found: {0}")]
    EmailNotFound(String),

    // Validation errors
    #[error("Invalid request: {0}")]
    Validation(String),

    // Authentication errors
    #[error("Mail account not connected for user {user} in workspace {workspace}")]
    AccountNotConnected { workspace: String, user: String },

    #[error("Token expired for account {account}")]
    TokenExpired { account: String },

    #[error("Token refresh failed for account {account}: {reason}")]
    TokenRefreshFailed { account: String, reason: String },

    #[error("Token storage error: {0}")]
    Token(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    // Provider errors
    #[error("Mail provider error {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    ProviderResponse(String),

    // Storage errors
    #[error("Store error: {0}")]
    Store(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // MCP errors
    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Coarse error category surfaced to callers of the command processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    NotFoundError,
    ProviderError,
    ValidationError,
    InternalError,
}

impl Error {
    /// Category used when converting into a command response
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) => ErrorKind::ParseError,
            Error::EmailNotFound(_) => ErrorKind::NotFoundError,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::AccountNotConnected { .. }
            | Error::TokenExpired { .. }
            | Error::TokenRefreshFailed { .. }
            | Error::OAuth(_)
            | Error::Provider { .. }
            | Error::ProviderResponse(_)
            | Error::Http(_) => ErrorKind::ProviderError,
            _ => ErrorKind::InternalError,
        }
    }

    /// Returns true if this error indicates the user needs to reconnect the account
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::AccountNotConnected { .. }
                | Error::TokenExpired { .. }
                | Error::TokenRefreshFailed { .. }
        )
    }

    /// Returns an error code suitable for MCP error responses
    pub fn mcp_code(&self) -> &'static str {
        match self {
            Error::McpProtocol(_) => "PROTOCOL_ERROR",
            Error::ToolNotFound(_) => "TOOL_NOT_FOUND",
            _ => match self.kind() {
                ErrorKind::ParseError => "PARSE_ERROR",
                ErrorKind::NotFoundError => "EMAIL_NOT_FOUND",
                ErrorKind::ProviderError => "PROVIDER_ERROR",
                ErrorKind::ValidationError => "INVALID_REQUEST",
                ErrorKind::InternalError => "INTERNAL_ERROR",
            },
        }
    }

    /// Message safe to show to the end user.
    ///
    /// Provider failures never include the raw provider text.
    pub fn user_message(&self) -> String {
        match self {
            Error::Parse(_) => "I couldn't understand that command. Try something like \
                \"show me unread emails this week\", \"archive emails from yesterday\" or \
                \"email john@example.com about the Q3 budget\"."
                .to_string(),
            Error::EmailNotFound(_) => "Email not found.".to_string(),
            Error::Validation(reason) => reason.clone(),
            _ if self.requires_reauth() => {
                "Your email account is not connected or its authorization has expired. \
                 Please reconnect your account and try again."
                    .to_string()
            }
            _ if self.kind() == ErrorKind::ProviderError => {
                "The mail provider could not complete the request. \
                 If this keeps happening, try reconnecting your account."
                    .to_string()
            }
            _ => "Something went wrong while processing your command.".to_string(),
        }
    }
}
