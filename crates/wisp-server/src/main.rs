//! # Wisp Server
//!
//! Realtime namespace/room event server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! wisp
//!
//! # Run with a config file in the working directory
//! cp wisp.example.toml wisp.toml && wisp
//!
//! # Run with an explicit config file (environment overrides are skipped)
//! wisp /path/to/wisp.toml
//!
//! # Run with environment variables
//! WISP_PORT=8080 WISP_HOST=0.0.0.0 WISP_NAMESPACES=/chat,/news wisp
//! ```

mod commands;
mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wisp=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    tracing::info!("Starting Wisp server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
