//! TideKV server entry point.
//!
//! Parses flags, sets up logging, builds the shared state and runs the
//! accept loop until Ctrl+C.

use std::sync::Arc;
use tidekv::config::Config;
use tidekv::replication::ReplicationState;
use tidekv::server::Server;
use tidekv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    println!(
        "TideKV v{} - in-memory key-value store\nListening on {}\n",
        tidekv::VERSION,
        config.bind_address()
    );

    let storage = Arc::new(StorageEngine::new());
    let replication = Arc::new(ReplicationState::with_role(config.initial_role()));
    info!(
        replid = %replication.replid(),
        role = %replication.role(),
        "Replication state initialized"
    );

    let _sweeper = config
        .active_expiry
        .then(|| ExpirySweeper::start(Arc::clone(&storage), ExpiryConfig::default()));

    let server = Server::bind(config.bind_address(), Arc::clone(&storage), replication).await?;

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = server.run() => {}
        _ = shutdown => {}
    }

    let stats = storage.stats();
    info!(
        keys = stats.keys,
        get_ops = stats.get_ops,
        set_ops = stats.set_ops,
        expired = stats.expired,
        "Server shutdown complete"
    );
    Ok(())
}
