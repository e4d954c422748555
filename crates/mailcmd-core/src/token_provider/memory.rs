//! In-memory token provider, for embedding and tests

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{OAuthTokens, TokenProvider};
use crate::error::Result;

#[derive(Default)]
pub struct MemoryTokenProvider {
    tokens: RwLock<HashMap<String, OAuthTokens>>,
}

impl MemoryTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_tokens(self, account_key: impl Into<String>, tokens: OAuthTokens) -> Self {
        self.tokens.write().insert(account_key.into(), tokens);
        self
    }
}

#[async_trait]
impl TokenProvider for MemoryTokenProvider {
    async fn get_tokens(&self, account_key: &str) -> Result<Option<OAuthTokens>> {
        Ok(self.tokens.read().get(account_key).cloned())
    }

    async fn store_tokens(&self, account_key: &str, tokens: &OAuthTokens) -> Result<()> {
        self.tokens
            .write()
            .insert(account_key.to_string(), tokens.clone());
        Ok(())
    }
}
