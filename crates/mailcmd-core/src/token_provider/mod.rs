//! Pluggable OAuth token storage providers
//!
//! Credentials are stored per user and workspace. The processor never reads
//! them directly; the mail provider adapter resolves them lazily through
//! [`OAuthManager`](crate::oauth::OAuthManager).
//!
//! # Configuration
//!
//! In `config.toml`:
//!
//! ```toml
//! [tokens]
//! provider = "file"
//! ```

mod file;
mod memory;

pub use file::FileTokenProvider;
pub use memory::MemoryTokenProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, TokenProviderConfig};
use crate::error::Result;

/// Stored OAuth credential record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    /// Access token for API calls
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    pub refresh_token: String,

    /// Token expiry timestamp (Unix seconds)
    pub expires_at: i64,

    /// Token scopes
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthTokens {
    /// Check if the access token is expired or will expire soon
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        // Consider expired if less than 5 minutes remaining
        self.expires_at < now + 300
    }
}

/// Key identifying one user's credentials inside a workspace
pub fn account_key(workspace_id: &str, user_id: &str) -> String {
    format!("{}/{}", workspace_id, user_id)
}

/// Trait for OAuth token storage backends
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get tokens for an account key
    async fn get_tokens(&self, account_key: &str) -> Result<Option<OAuthTokens>>;

    /// Store tokens for an account key
    async fn store_tokens(&self, account_key: &str, tokens: &OAuthTokens) -> Result<()>;
}

/// Create a token provider based on configuration
pub fn create_token_provider(config: &Config) -> Arc<dyn TokenProvider> {
    match &config.tokens {
        TokenProviderConfig::File { dir } => match dir {
            Some(dir) => Arc::new(FileTokenProvider::with_dir(dir.clone())),
            None => Arc::new(FileTokenProvider::new()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_tokens_expiry() {
        let tokens = OAuthTokens {
            access_token: "test".to_string(),
            refresh_token: "test".to_string(),
            expires_at: chrono::Utc::now().timestamp() + 3600, // 1 hour from now
            scopes: vec![],
        };
        assert!(!tokens.is_expired());

        let soon_expired_tokens = OAuthTokens {
            expires_at: chrono::Utc::now().timestamp() + 60, // 1 minute from now
            ..tokens
        };
        assert!(soon_expired_tokens.is_expired()); // Within 5-minute grace period
    }

    #[tokio::test]
    async fn test_file_provider_creation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.tokens = TokenProviderConfig::File {
            dir: Some(dir.path().to_path_buf()),
        };
        let provider = create_token_provider(&config);

        // Should be able to query without error
        let result = provider.get_tokens(&account_key("ws", "u")).await;
        assert!(matches!(result, Ok(None)));
    }
}
