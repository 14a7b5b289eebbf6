//! valkey-replication-operator - A Kubernetes operator for managing Valkey
//! replication groups.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Starts the controller until shutdown is requested

use kube::Client;
use tokio::signal;
use tracing::{error, info};

use valkey_replication_operator::run_controller;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("valkey_replication_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting valkey-replication-operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let controller_handle = tokio::spawn(async move {
        run_controller(client).await;
        error!("Controller exited");
    });

    signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping controller");
    controller_handle.abort();

    Ok(())
}
