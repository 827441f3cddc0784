//! Metal Provider Controller
//!
//! Cluster API infrastructure provider for bare-metal servers:
//! - MetalCluster: infrastructure gate of a Cluster; holds deletion until the
//!   cluster's machines are gone
//! - MetalMachine: claims a physical server through a ServerClaim, hands it
//!   the machine's ignition data and publishes its provider identity
//!
//! Machines are provisioned by the server-claim subsystem; this controller
//! only records intent and observes the outcome.

mod backoff;
mod config;
mod controller;
mod converge;
mod error;
mod metrics;
mod pipeline;
mod reconciler;
mod scope;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    init_tracing();

    // kube's rustls stack needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting metal provider controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Cluster requeue: {:?}", config.cluster_requeue);
    info!("  Machine requeue: {:?}", config.machine_requeue);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Metrics address: {}", config.metrics_bind_address);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
