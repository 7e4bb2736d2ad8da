//! LeadDesk daemon - backoffice service for leads, quotes and client acceptance

use anyhow::Context;
use clap::Parser;
use leaddesk_daemon::config::StorageConfig;
use leaddesk_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// LeadDesk daemon CLI
#[derive(Parser)]
#[command(name = "leaddeskd")]
#[command(about = "LeadDesk - lead pipeline and quote acceptance service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "LEADDESK_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "LEADDESK_LISTEN_ADDR")]
    listen: Option<String>,

    /// Storage backend: memory or postgres
    #[arg(long, env = "LEADDESK_STORAGE_BACKEND")]
    storage: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "LEADDESK_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(long, env = "LEADDESK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "LEADDESK_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config =
        DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address: {}", listen))?;
    }

    match (cli.storage.as_deref(), cli.database_url) {
        (Some("memory"), _) => config.storage = StorageConfig::Memory,
        (Some("postgres"), Some(url)) | (None, Some(url)) => {
            config.storage = StorageConfig::postgres(url)
        }
        (Some("postgres"), None) => {
            if !matches!(config.storage, StorageConfig::Postgres { .. }) {
                anyhow::bail!("postgres storage requires --database-url");
            }
        }
        (Some(other), _) => anyhow::bail!("unknown storage backend: {}", other),
        (None, None) => {}
    }

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "Starting LeadDesk daemon"
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}
