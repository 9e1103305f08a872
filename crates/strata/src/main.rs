//! Strata Daemon - tiered memory store with background migration

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use strata::admin::{self, AppState};
use strata::config::Config;
use strata::error::Result;
use strata::storage::{TierScheduler, TierStore};

/// Strata - tiered memory store with access-driven migration
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "A tiered memory store that migrates records by access pattern")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (default command)
    #[command(name = "serve")]
    Serve,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => serve(cli.config).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Strata daemon");

    let config = Config::load(config_path.as_deref())?;
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    let data_dir = &config.storage.data_dir;
    tracing::info!("Initializing storage at: {}", data_dir.display());

    std::fs::create_dir_all(data_dir).map_err(|e| {
        strata::StrataError::Storage(format!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            e
        ))
    })?;

    let store = Arc::new(TierStore::open(data_dir, config.tier_config()).await?);
    let scheduler = Arc::new(TierScheduler::new(
        Arc::clone(&store),
        config.scheduler.clone(),
    )?);
    scheduler.start();

    let served = if config.admin.enabled {
        let addr = config.admin_addr()?;
        let state = Arc::new(AppState::new(Arc::clone(&store)).with_scheduler(Arc::clone(&scheduler)));
        admin::serve(addr, state, shutdown_signal()).await
    } else {
        tracing::info!("Admin server disabled, waiting for shutdown signal");
        shutdown_signal().await;
        Ok(())
    };

    scheduler.stop().await;
    store.close().await?;
    served?;

    tracing::info!("Strata daemon stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
