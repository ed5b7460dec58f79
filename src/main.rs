use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use weather_ingest::config::Config;
use weather_ingest::notifier::{ChannelNotifier, NotificationManager};
use weather_ingest::service::IngestionService;

#[derive(Parser, Debug)]
#[command(name = "weather-ingest", about = "Weather station telemetry ingestion server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/weather-ingest/config.toml")]
    config: String,

    /// Validate config and exit
    #[arg(long)]
    check: bool,

    /// Print version and exit
    #[arg(short, long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("weather-ingest {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Load configuration
    let config = Config::load(&cli.config)?;

    if cli.check {
        println!("Configuration is valid.");
        return Ok(());
    }

    init_logging(&config)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.name,
        data_dir = %config.server.data_dir.display(),
        "Starting weather ingestion server"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Server terminated with error");
        return Err(e);
    }

    Ok(())
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(&config.server.log_level)
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn run(config: Config) -> Result<()> {
    // Notification queue and its consumer
    let (notifier, notification_rx) = ChannelNotifier::channel(config.notifications.queue_capacity);
    let manager = NotificationManager::new(&config.notifications)?;
    let dispatcher = tokio::spawn(manager.run(notification_rx));

    let service = IngestionService::new(
        &config.server.data_dir,
        config.thresholds,
        Arc::new(notifier),
    )
    .with_context(|| format!("Failed to prepare data directory {}", config.server.data_dir.display()))?;

    info!(
        sh_spike = config.thresholds.sh_spike,
        heat_index = config.thresholds.heat_index,
        "Ingestion service ready"
    );

    #[cfg(feature = "nats")]
    let handlers = {
        let client = weather_ingest::rpc::connect(&config.nats).await?;
        weather_ingest::rpc::start_handlers(client, &config.nats.subject_prefix, service.clone())
    };

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, closing open sessions");

    #[cfg(feature = "nats")]
    {
        for handle in handlers {
            handle.abort();
        }
    }

    let store = service.store().clone();
    let closed = tokio::task::spawn_blocking(move || store.close_all()).await?;
    info!(closed, "Open sessions closed");

    // Dropping the last notifier ends the dispatcher once the queue drains
    drop(service);
    if let Err(e) = dispatcher.await {
        error!(error = %e, "Notification dispatcher failed");
    }

    Ok(())
}
