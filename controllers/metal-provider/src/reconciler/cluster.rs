//! MetalCluster reconciler
//!
//! The MetalCluster carries no infrastructure of its own; it is the gate every
//! MetalMachine of the cluster waits on. On deletion it holds its finalizer
//! until no MetalMachine of the cluster is left.

use super::{NextAction, Reconcile, finish, owner_name};
use crate::error::{ControllerError, StepContext};
use crate::scope::{ClusterScope, ClusterScopeParams};
use crds::is_paused;
use futures::FutureExt;
use record_store::RecordStore;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Reconciles MetalCluster records.
pub struct ClusterReconciler {
    store: Arc<dyn RecordStore>,
    requeue: Duration,
}

impl ClusterReconciler {
    /// `requeue` is the fixed re-check delay while machines are still being deleted.
    pub fn new(store: Arc<dyn RecordStore>, requeue: Duration) -> Self {
        Self { store, requeue }
    }

    async fn reconcile_normal(&self, scope: &mut ClusterScope) -> Result<NextAction, ControllerError> {
        debug!("Reconciling MetalCluster {}/{}", scope.namespace(), scope.infra_cluster_name());

        if scope.ensure_finalizer() {
            info!("Adding finalizer to MetalCluster {}/{}", scope.namespace(), scope.infra_cluster_name());
        }
        scope.mark_cluster_ready();
        scope.set_ready();

        Ok(NextAction::Done)
    }

    async fn reconcile_delete(&self, scope: &mut ClusterScope) -> Result<NextAction, ControllerError> {
        let namespace = scope.namespace().to_string();
        let name = scope.infra_cluster_name().to_string();

        if !scope.cluster_is_deleting() {
            error!(
                "MetalCluster {}/{} is being deleted while Cluster {} is not; delete the Cluster instead",
                namespace,
                name,
                scope.name()
            );
            return Ok(NextAction::Done);
        }

        let machines = self
            .store
            .list_metal_machines(&namespace, scope.name())
            .await
            .step("list MetalMachines")?;
        if !machines.is_empty() {
            info!(
                "Waiting for {} MetalMachine(s) of cluster {} to be deleted before releasing MetalCluster {}/{}",
                machines.len(),
                scope.name(),
                namespace,
                name
            );
            return Ok(NextAction::RequeueAfter(self.requeue));
        }

        if scope.remove_finalizer() {
            info!("Removing finalizer from MetalCluster {}/{}", namespace, name);
        }
        Ok(NextAction::Done)
    }
}

#[async_trait::async_trait]
impl Reconcile for ClusterReconciler {
    const NAME: &'static str = "metalcluster";

    async fn reconcile(&self, namespace: &str, name: &str) -> Result<NextAction, ControllerError> {
        let Some(metal_cluster) = self
            .store
            .get_metal_cluster(namespace, name)
            .await
            .step("get MetalCluster")?
        else {
            debug!("MetalCluster {}/{} not found, nothing to do", namespace, name);
            return Ok(NextAction::Done);
        };

        let Some(cluster_name) = owner_name(&metal_cluster.metadata, "Cluster").map(str::to_string) else {
            info!("Waiting for Cluster controller to set owner reference on MetalCluster {}/{}", namespace, name);
            return Ok(NextAction::Done);
        };

        let Some(cluster) = self
            .store
            .get_cluster(namespace, &cluster_name)
            .await
            .step("get owner Cluster")?
        else {
            info!("Owner Cluster {}/{} of MetalCluster {} not found yet", namespace, cluster_name, name);
            return Ok(NextAction::Done);
        };

        if is_paused(&cluster, &metal_cluster) {
            info!("MetalCluster {}/{} or its Cluster is marked as paused, not reconciling", namespace, name);
            return Ok(NextAction::Done);
        }

        let mut scope = ClusterScope::new(ClusterScopeParams {
            store: Some(self.store.clone()),
            cluster: Some(cluster),
            metal_cluster: Some(metal_cluster),
        })?;

        let body = if scope.is_deleting() {
            AssertUnwindSafe(self.reconcile_delete(&mut scope)).catch_unwind().await
        } else {
            AssertUnwindSafe(self.reconcile_normal(&mut scope)).catch_unwind().await
        };
        let closed = scope.close().await;
        finish(body, closed, "commit MetalCluster")
    }
}
