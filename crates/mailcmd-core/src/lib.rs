//! mailcmd Core Library
//!
//! Natural-language mailbox commands: intent parsing with a language model,
//! predicate search over a workspace email index, Gmail actions behind a
//! draft confirmation step, and an MCP server for tool-driven clients.

pub mod config;
pub mod error;
pub mod extract;
pub mod intent;
pub mod llm;
pub mod mcp;
pub mod models;
pub mod oauth;
pub mod processor;
pub mod provider;
pub mod search;
pub mod store;
pub mod token_provider;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;
pub use processor::CommandProcessor;

/// Application name for config paths
pub const APP_NAME: &str = "mailcmd";
