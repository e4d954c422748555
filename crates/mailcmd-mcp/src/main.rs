//! mailcmd MCP Server
//!
//! Spawned by an MCP client to run natural-language mailbox commands.
//! Communicates via stdio JSON-RPC.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use mailcmd_core::config::Config;
use mailcmd_core::llm::OpenAiClient;
use mailcmd_core::mcp::McpServer;
use mailcmd_core::oauth::OAuthManager;
use mailcmd_core::provider::GmailTransport;
use mailcmd_core::store::MemoryEmailStore;
use mailcmd_core::token_provider::create_token_provider;
use mailcmd_core::CommandProcessor;

#[tokio::main]
async fn main() -> Result<()> {
    // Load config first to get log path
    let config = Config::load().unwrap_or_else(|_| Config::default());

    // stdout carries the protocol, so logs only go to a file
    let log_dir = config.logs_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "mcp.log");

    let filter =
        EnvFilter::try_new(&config.general.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(file_layer.with_filter(filter))
        .init();

    info!("mailcmd MCP server starting");

    let store = Arc::new(
        MemoryEmailStore::open(config.store_path())
            .with_context(|| format!("opening email index at {:?}", config.store_path()))?,
    );

    let llm = Arc::new(OpenAiClient::new(&config.llm).map_err(|e| {
        error!("Failed to create completion client: {}", e);
        e
    })?);

    let transport = Arc::new(GmailTransport::new(&config.provider)?);
    let oauth = Arc::new(OAuthManager::new(create_token_provider(&config)));

    let processor = CommandProcessor::new(&config, llm, store, transport, oauth);
    let server = McpServer::new(Arc::new(processor));

    server.run().await?;

    info!("mailcmd MCP server stopped");
    Ok(())
}
