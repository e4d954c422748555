//! File-based token provider
//!
//! Stores tokens in ~/.config/mailcmd/tokens/<workspace>/<user>.json

use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::config::get_config_dir;
use crate::error::{Error, Result};

use super::{OAuthTokens, TokenProvider};

/// File-based token provider (the default)
pub struct FileTokenProvider {
    dir: PathBuf,
}

impl FileTokenProvider {
    /// Create a provider rooted at the default tokens directory
    pub fn new() -> Self {
        Self::with_dir(get_config_dir().join("tokens"))
    }

    /// Create a provider rooted at `dir`
    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Keep path segments filesystem-safe
    fn sanitize(segment: &str) -> String {
        segment
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else if c == '@' {
                    '+'
                } else {
                    '_'
                }
            })
            .collect()
    }

    fn token_path(&self, account_key: &str) -> PathBuf {
        let mut path = self.dir.clone();
        let mut segments: Vec<String> = account_key.split('/').map(Self::sanitize).collect();
        let file = segments.pop().unwrap_or_default();
        for segment in segments {
            path.push(segment);
        }
        path.push(format!("{}.json", file));
        path
    }
}

impl Default for FileTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn get_tokens(&self, account_key: &str) -> Result<Option<OAuthTokens>> {
        let path = self.token_path(account_key);
        if !path.exists() {
            debug!("No tokens found for {}", account_key);
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| Error::Token(format!("Failed to read {:?}: {}", path, e)))?;
        let tokens: OAuthTokens = serde_json::from_str(&contents)?;
        debug!("Retrieved OAuth tokens for {}", account_key);
        Ok(Some(tokens))
    }

    async fn store_tokens(&self, account_key: &str, tokens: &OAuthTokens) -> Result<()> {
        let path = self.token_path(account_key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(tokens)?;
        fs::write(&path, data)
            .map_err(|e| Error::Token(format!("Failed to write {:?}: {}", path, e)))?;
        debug!("Stored OAuth tokens for {}", account_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_provider::account_key;

    #[tokio::test]
    async fn test_store_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTokenProvider::with_dir(dir.path().to_path_buf());
        let key = account_key("ws-1", "jamie@company.com");

        assert!(provider.get_tokens(&key).await.unwrap().is_none());

        let tokens = OAuthTokens {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: 42,
            scopes: vec!["https://mail.google.com/".to_string()],
        };
        provider.store_tokens(&key, &tokens).await.unwrap();

        assert_eq!(provider.get_tokens(&key).await.unwrap(), Some(tokens));
        assert!(dir.path().join("ws-1").join("jamie+company_com.json").exists());
    }
}
