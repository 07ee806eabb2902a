//! Quorum daemon - database cluster reconciliation operator
//!
//! The daemon provides:
//! - Reconcile loop driving clusters toward their desired state
//! - Scope watching with debounced restarts
//! - Diagnostics API and Prometheus metrics

use clap::Parser;
use quorum_operator::error::{OperatorError, OperatorResult};
use quorum_operator::{LogFormat, OperatorConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quorum daemon CLI
#[derive(Parser)]
#[command(name = "quorumd")]
#[command(about = "Quorum - database cluster reconciliation operator", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUORUM_CONFIG")]
    config: Option<String>,

    /// Listen address for the diagnostics API
    #[arg(short, long, env = "QUORUM_LISTEN_ADDR")]
    listen: Option<String>,

    /// Watched namespace (repeatable); none watches every namespace
    #[arg(short, long = "namespace")]
    namespaces: Vec<String>,

    /// Log level
    #[arg(long, env = "QUORUM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "QUORUM_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> OperatorResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = OperatorConfig::load(cli.config.as_deref())
        .map_err(|e| OperatorError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| OperatorError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if !cli.namespaces.is_empty() {
        config.scope.namespaces = cli.namespaces.iter().cloned().collect();
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.format = LogFormat::Json;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        prometheus = config.metrics.prometheus_url.as_deref().unwrap_or("none"),
        "Starting quorumd"
    );

    Server::new(config)?.run().await
}
