mod comparator;
mod config;
mod controller;
mod depclient;
mod locator;
mod metrics;
mod models;
mod scheduler;
mod status;
mod template;

use anyhow::Result;
use kube::Client;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "policy_reconciler=info,kube=info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting the policy reconciliation engine");

    let client = Client::try_default().await?;

    let config = config::PolicyControllerConfig::load();

    let metrics_handle = metrics::start_metrics_server().await?;
    let controller_handle = controller::start_controllers(client, config).await?;

    info!("Policy reconciliation engine is running");

    tokio::select! {
        _ = metrics_handle => info!("Metrics server stopped"),
        _ = controller_handle => info!("Policy evaluator loops stopped"),
    }

    Ok(())
}
