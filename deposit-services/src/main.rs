//! Deposit services (deposit-services) - Main entry point
//!
//! Runs the notification-driven deposit daemon, or refreshes the remote
//! status of individual deposits on demand.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deposit_common::config::{DepositServicesConfig, CONFIG_ENV_VAR};
use deposit_common::ResourceId;
use deposit_services::DepositServices;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Command-line arguments for deposit-services
#[derive(Parser, Debug)]
#[command(name = "deposit-services")]
#[command(about = "Deposits submissions into downstream repositories")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process resource notifications until interrupted (default)
    Serve,
    /// Refresh the remote status of the given deposits
    Refresh {
        /// Deposit URIs
        #[arg(required = true)]
        deposits: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing before loading config so its warnings are not lost.
    // RUST_LOG wins; otherwise the configured level replaces "info" below.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().ok();
    let env_overrides = env_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        env_filter.unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, config_path) = DepositServicesConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    if !env_overrides {
        if let Err(e) =
            filter_handle.reload(tracing_subscriber::EnvFilter::new(&config.logging.level))
        {
            warn!("Failed to apply log level '{}': {}", config.logging.level, e);
        }
    }

    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: compiled defaults"),
    }

    let services = DepositServices::builder(config)
        .build()
        .await
        .context("Failed to initialize deposit services")?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!("Starting deposit services");
            services.start();
            shutdown_signal().await;
            services.shutdown().await;
            info!("Shutdown complete");
        }
        Command::Refresh { deposits } => {
            let ids: Vec<ResourceId> = deposits.into_iter().map(ResourceId::from).collect();
            let summary = services.updater().update(&ids).await;
            println!(
                "refreshed: {}, unchanged: {}, failed: {}",
                summary.refreshed, summary.unchanged, summary.failed
            );
            if summary.failed > 0 {
                anyhow::bail!("{} deposit(s) could not be refreshed", summary.failed);
            }
        }
    }
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
