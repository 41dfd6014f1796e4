//! Flight surety synchronizer
//!
//! Keeps account, contract and operational status in sync with the chain.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use surety_sync::{Deployments, HealthServer, RpcEnvironment, SyncConfig, SyncOptions, Synchronizer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,surety_sync=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(true)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Flight surety synchronizer starting");

    let config = SyncConfig::from_env()?;

    info!(
        rpc_url = config.rpc_url.as_deref().unwrap_or("<none>"),
        local_wallet = config.wallet_private_key.is_some(),
        deployments = %config.deployments_path,
        network = %config.network,
        poll_interval_ms = config.account_poll_interval_ms,
        health_port = config.health_port,
        "Configuration loaded"
    );

    let deployments = Deployments::load(&config.deployments_path)
        .with_context(|| format!("loading {}", config.deployments_path))?;
    info!(networks = deployments.len(), "Deployments loaded");

    let env = RpcEnvironment::from_config(&config)?;

    let sync = Arc::new(
        Synchronizer::builder(deployments)
            .options(SyncOptions::from(&config))
            .start(&env),
    );

    let health_server = HealthServer::new(Arc::clone(&sync), config.health_port);

    tokio::select! {
        result = health_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "Health server failed");
                sync.shutdown();
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    sync.shutdown();
    info!("Synchronizer stopped");
    Ok(())
}
