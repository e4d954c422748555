//! OAuth 2.0 token use and refresh for Google accounts
//!
//! Consent flows live outside this crate; only stored tokens are used here.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::token_provider::{account_key, OAuthTokens, TokenProvider};

/// Google OAuth client configuration
pub struct GoogleOAuthConfig {
    /// OAuth client ID
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        // Try env vars first, then fall back to ~/.secrets file
        let (client_id, client_secret) = Self::load_credentials();
        Self {
            client_id,
            client_secret,
        }
    }
}

impl GoogleOAuthConfig {
    /// Load OAuth credentials from env vars or ~/.secrets file
    fn load_credentials() -> (String, String) {
        let client_id = std::env::var("MAILCMD_CLIENT_ID")
            .or_else(|_| std::env::var("GOOGLE_CLIENT_ID"))
            .ok();
        let client_secret = std::env::var("MAILCMD_CLIENT_SECRET")
            .or_else(|_| std::env::var("GOOGLE_CLIENT_SECRET"))
            .ok();

        if let (Some(id), Some(secret)) = (client_id, client_secret) {
            return (id, secret);
        }

        if let Some(home) = dirs::home_dir() {
            if let Ok(contents) = std::fs::read_to_string(home.join(".secrets")) {
                if let (Some(id), Some(secret)) = Self::parse_secrets_file(&contents) {
                    return (id, secret);
                }
            }
        }

        // Placeholders; refresh will fail with a descriptive error
        ("YOUR_CLIENT_ID".to_string(), "YOUR_CLIENT_SECRET".to_string())
    }

    /// Parse shell-style exports from secrets file
    fn parse_secrets_file(contents: &str) -> (Option<String>, Option<String>) {
        let mut client_id = None;
        let mut client_secret = None;

        for line in contents.lines() {
            let line = line.trim();
            // Parse: export VAR_NAME="value" or export VAR_NAME='value'
            if let Some(rest) = line.strip_prefix("export ") {
                if let Some((key, value)) = rest.split_once('=') {
                    let value = value.trim().trim_matches('"').trim_matches('\'');
                    match key.trim() {
                        "MAILCMD_CLIENT_ID" => client_id = Some(value.to_string()),
                        "MAILCMD_CLIENT_SECRET" => client_secret = Some(value.to_string()),
                        _ => {}
                    }
                }
            }
        }

        (client_id, client_secret)
    }
}

/// Google token endpoint
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Response from Google token endpoint
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: String,
    pub scope: Option<String>,
}

/// Resolves stored credentials and refreshes them when they expire
pub struct OAuthManager {
    config: GoogleOAuthConfig,
    client: Client,
    token_provider: Arc<dyn TokenProvider>,
}

impl OAuthManager {
    /// Create a new OAuth manager with token provider
    pub fn new(token_provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_config(GoogleOAuthConfig::default(), token_provider)
    }

    /// Create with custom config
    pub fn with_config(config: GoogleOAuthConfig, token_provider: Arc<dyn TokenProvider>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            config,
            client,
            token_provider,
        }
    }

    /// Refresh an access token
    async fn refresh(&self, key: &str, current: OAuthTokens) -> Result<OAuthTokens> {
        debug!("Refreshing access token for {}", key);

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", current.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::TokenRefreshFailed {
                account: key.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Token refresh failed for {}: {} - {}", key, status, body);
            return Err(Error::TokenRefreshFailed {
                account: key.to_string(),
                reason: format!("{} - {}", status, body),
            });
        }

        let token_response: TokenResponse = response.json().await?;
        let expires_at = chrono::Utc::now().timestamp() + token_response.expires_in;

        let new_tokens = OAuthTokens {
            access_token: token_response.access_token,
            // Keep the old refresh token if not provided
            refresh_token: token_response
                .refresh_token
                .unwrap_or(current.refresh_token),
            expires_at,
            scopes: current.scopes,
        };

        self.token_provider.store_tokens(key, &new_tokens).await?;
        info!("Refreshed access token for {}", key);

        Ok(new_tokens)
    }

    /// Get a valid access token for a user, refreshing if necessary.
    ///
    /// Fails with [`Error::AccountNotConnected`] when nothing is stored.
    pub async fn get_valid_token(&self, workspace_id: &str, user_id: &str) -> Result<String> {
        let key = account_key(workspace_id, user_id);
        debug!("Getting valid token for {}", key);

        let tokens = self
            .token_provider
            .get_tokens(&key)
            .await?
            .ok_or_else(|| Error::AccountNotConnected {
                workspace: workspace_id.to_string(),
                user: user_id.to_string(),
            })?;

        if tokens.is_expired() {
            if tokens.refresh_token.is_empty() {
                return Err(Error::TokenExpired { account: key });
            }
            info!("Token expired for {}, refreshing...", key);
            let new_tokens = self.refresh(&key, tokens).await?;
            Ok(new_tokens.access_token)
        } else {
            debug!("Token still valid for {}", key);
            Ok(tokens.access_token)
        }
    }
}
