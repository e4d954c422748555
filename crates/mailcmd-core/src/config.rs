//! Configuration management for mailcmd

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Completion service settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Mail provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Command processor tuning
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Token storage provider configuration
    #[serde(default)]
    pub tokens: TokenProviderConfig,
}

/// Token storage provider configuration
///
/// ```toml
/// [tokens]
/// provider = "file"
/// dir = "/var/lib/mailcmd/tokens"  # optional
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum TokenProviderConfig {
    /// File-based token storage (default)
    /// Stores tokens in ~/.config/mailcmd/tokens/<workspace>/<user>.json
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<PathBuf>,
    },
}

impl Default for TokenProviderConfig {
    fn default() -> Self {
        Self::File { dir: None }
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// User's timezone (e.g., "America/Los_Angeles", "UTC").
    /// Relative dates like "today" or "last week" are resolved in this zone.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_timezone() -> String {
    std::env::var("TZ").unwrap_or_else(|_| "UTC".to_string())
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            timezone: default_timezone(),
        }
    }
}

/// Completion service settings (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL, without the trailing `/chat/completions`
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default = "default_llm_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            model: default_llm_model(),
            api_key_env: default_llm_api_key_env(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Mail provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Gmail REST base URL
    #[serde(default = "default_provider_api_base")]
    pub api_base: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: default_provider_api_base(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Command processor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Maximum number of emails returned by a search
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Emails sent to the model when extracting action items
    #[serde(default = "default_action_item_batch")]
    pub action_item_batch: usize,

    /// Emails sent to the model for summaries and analyses
    #[serde(default = "default_analysis_batch")]
    pub analysis_batch: usize,

    /// Phone number matches with fewer digits are discarded
    #[serde(default = "default_min_phone_digits")]
    pub min_phone_digits: usize,

    /// Window used by the sentiment analysis
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            action_item_batch: default_action_item_batch(),
            analysis_batch: default_analysis_batch(),
            min_phone_digits: default_min_phone_digits(),
            recency_days: default_recency_days(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    get_data_dir()
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_provider_api_base() -> String {
    "https://gmail.googleapis.com/gmail/v1/users/me".to_string()
}

fn default_provider_timeout() -> u64 {
    20
}

fn default_search_limit() -> usize {
    20
}

fn default_action_item_batch() -> usize {
    20
}

fn default_analysis_batch() -> usize {
    10
}

fn default_min_phone_digits() -> usize {
    10
}

fn default_recency_days() -> i64 {
    7
}

/// Get the data directory (XDG: ~/.local/share/mailcmd)
fn get_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local")
        .join("share")
        .join("mailcmd")
}

/// Get the config directory (XDG: ~/.config/mailcmd)
pub(crate) fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("mailcmd")
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = get_config_dir().join("config.toml");
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        } else {
            info!("No config file found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get the email index snapshot path
    pub fn store_path(&self) -> PathBuf {
        self.general.data_dir.join("emails.json")
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.general.data_dir.join("logs")
    }

    /// Parse the configured timezone, falling back to UTC
    pub fn timezone(&self) -> chrono_tz::Tz {
        match self.general.timezone.parse::<chrono_tz::Tz>() {
            Ok(tz) => tz,
            Err(_) => {
                warn!("Unknown timezone '{}', using UTC", self.general.timezone);
                chrono_tz::UTC
            }
        }
    }
}
