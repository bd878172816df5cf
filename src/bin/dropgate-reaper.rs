//! Cleanup reaper process: removes expired files until interrupted.

use std::sync::Arc;

use tracing::{error, info};

use dropgate::error::EXIT_FAILURE;
use dropgate::{CleanupReaper, Config, Database, SystemClock};

#[tokio::main]
async fn main() {
    let config = match Config::from_process_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    };

    dropgate::logging::init(&config.logging);

    let db = match Database::open(&config.database.url, config.database.max_connections).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    info!(
        data_dir = %config.storage.data_dir,
        ttl_days = config.storage.ttl_days,
        interval_secs = config.cleanup.interval_secs,
        "dropgate reaper starting"
    );

    let reaper = CleanupReaper::new(db.clone(), Arc::new(SystemClock), config.cleanup.interval());

    tokio::select! {
        _ = reaper.run() => {}
        _ = shutdown_signal() => {}
    }

    db.close().await;
    info!("dropgate reaper stopped");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
