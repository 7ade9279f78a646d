//! HTTP decoy responder.
//!
//! Impersonates an HTTP server on every configured port, records what each
//! scanner sends and answers with a canned response.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 HTTP DECOY                   │
//!                         │                                              │
//!   Scanner connection    │  ┌──────────┐   ┌────────────┐   ┌────────┐  │
//!   ──────────────────────┼─▶│   net    │──▶│   http     │──▶│ decode │  │
//!                         │  │ listener │   │  server    │   │ request│  │
//!                         │  └──────────┘   └─────┬──────┘   └───┬────┘  │
//!                         │                       │              │       │
//!                         │                ┌──────▼─────┐  ┌─────▼────┐  │
//!                         │                │ flow table │  │ events → │  │
//!                         │                │ (dest port)│  │ tracing  │  │
//!                         │                └────────────┘  └─────┬────┘  │
//!   Canned response       │                                ┌─────▼────┐  │
//!   ◀─────────────────────┼────────────────────────────────│ response │  │
//!                         │                                └──────────┘  │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use http_decoy::config::{load_config, validation::validate_config, ConfigError, DecoyConfig};
use http_decoy::lifecycle::startup::{self, WatchedFile};
use http_decoy::observability::logging;

#[derive(Parser)]
#[command(name = "http-decoy")]
#[command(about = "Decoy HTTP responder that logs scanner requests", long_about = None)]
struct Cli {
    /// TOML configuration file; watched for handler changes.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on; repeat for several ports. Replaces the configured list.
    #[arg(short, long = "bind")]
    bind: Vec<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => Some(load_config(path)?),
        None => None,
    };
    let mut config = file_config.clone().unwrap_or_default();
    if !cli.bind.is_empty() {
        config.listener.bind_addresses = cli.bind.clone();
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability)?;

    tracing::info!("http-decoy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_addresses = ?config.listener.bind_addresses,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        dump_requests = config.handler.dump_requests,
        "Configuration loaded"
    );

    let watched = cli
        .config
        .zip(file_config)
        .map(|(path, loaded)| WatchedFile { path, loaded });
    startup::run(config, watched).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
