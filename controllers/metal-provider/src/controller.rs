//! Main controller implementation.
//!
//! This module contains the `Controller` struct that owns the background
//! tasks of the metal provider:
//! - MetalCluster watcher: gates the cluster and sequences its deletion
//! - MetalMachine watcher: provisions machines through ServerClaims
//! - Metrics server: probes and Prometheus metrics

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::{self, Metrics};
use crate::reconciler::{ClusterReconciler, MachineReconciler};
use crate::watcher::{self, Context};
use kube::Client;
use record_store::{KubeRecordStore, RecordStore};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Main controller for the metal infrastructure provider.
pub struct Controller {
    metal_cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    metal_machine_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
    metrics: Arc<Metrics>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing metal provider controller");

        let client = Client::try_default().await?;
        let store: Arc<dyn RecordStore> = Arc::new(KubeRecordStore::new(client.clone()));
        let metrics = Arc::new(Metrics::new()?);

        let cluster_ctx = Arc::new(Context::new(
            ClusterReconciler::new(store.clone(), config.cluster_requeue),
            &config,
            metrics.clone(),
        ));
        let machine_ctx = Arc::new(Context::new(
            MachineReconciler::new(store, config.machine_requeue),
            &config,
            metrics.clone(),
        ));

        let metal_cluster_watcher = {
            let client = client.clone();
            let config = config.clone();
            tokio::spawn(async move { watcher::watch_metal_clusters(client, config, cluster_ctx).await })
        };

        let metal_machine_watcher = {
            let config = config.clone();
            tokio::spawn(async move { watcher::watch_metal_machines(client, config, machine_ctx).await })
        };

        let metrics_server = {
            let metrics = metrics.clone();
            let addr = config.metrics_bind_address;
            tokio::spawn(async move { metrics::serve(addr, metrics).await })
        };

        Ok(Self {
            metal_cluster_watcher,
            metal_machine_watcher,
            metrics_server,
            metrics,
        })
    }

    /// Runs until any background task exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Metal provider controller running");
        self.metrics.set_ready(true);

        // Watchers and the metrics server should run forever
        let result = tokio::select! {
            result = &mut self.metal_cluster_watcher => joined("MetalCluster watcher", result),
            result = &mut self.metal_machine_watcher => joined("MetalMachine watcher", result),
            result = &mut self.metrics_server => joined("Metrics server", result),
        };
        self.metrics.set_ready(false);
        result
    }
}

fn joined(
    task: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    match result {
        Ok(Ok(())) => {
            info!("{} exited", task);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("{} failed: {}", task, e);
            Err(e)
        }
        Err(e) => Err(ControllerError::Watch(format!("{task} panicked: {e}"))),
    }
}
