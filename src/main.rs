//! mail-bridge-mcp: IMAP/SMTP mail bridge MCP server over stdio
//!
//! Exposes mailbox search, message retrieval, per-day counts and sending as
//! MCP tools. Every protocol operation runs on a worker task under a
//! per-operation deadline, and each invocation uses its own IMAP session.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment-driven service configuration
//! - [`errors`]: Tagged application error model
//! - [`bridge`]: Worker offload and per-operation deadlines
//! - [`criteria`]: IMAP SEARCH predicate construction
//! - [`imap`]: IMAP transport operations with timeout wrappers
//! - [`session`]: Per-invocation IMAP session with explicit release
//! - [`query`]: Search and fetch orchestration
//! - [`daily`]: Per-day message counts
//! - [`mime`]: Message parsing and body selection
//! - [`smtp`]: Outbound composition and SMTP submission
//! - [`render`]: Text rendering of tool results
//! - [`server`]: MCP tool handlers
//! - [`models`]: Records and schema-bearing tool inputs

mod bridge;
mod config;
mod criteria;
mod daily;
mod errors;
mod imap;
mod mime;
mod models;
mod query;
mod render;
mod server;
mod session;
mod smtp;

use std::path::PathBuf;

use clap::Parser;
use config::ServiceConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line options
#[derive(Debug, Parser)]
#[command(version, about = "IMAP/SMTP mail bridge MCP server over stdio")]
struct Cli {
    /// Load environment variables from this file instead of `./.env`
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

/// Application entry point
///
/// Loads the environment, initializes tracing on stderr and serves the MCP
/// server over stdio. This process expects to be spawned by an MCP client
/// via `stdio` transport.
///
/// # Environment Variables
///
/// See [`ServiceConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// EMAIL_USERNAME=user@gmail.com \
/// EMAIL_PASSWORD=app-password \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let config = ServiceConfig::load_from_env()?;
    info!(
        account = %config.auth_account,
        imap = %config.imap_host,
        smtp = %config.smtp_host,
        "starting mail bridge"
    );
    let service = server::MailBridgeServer::new(config).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
