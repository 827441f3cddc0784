//! MetalMachine reconciler
//!
//! Drives a MetalMachine from "declared" to "bound to a physical server":
//! finalizer, ignition secret, ServerClaim, bind wait, provider identity,
//! ready. Each step is a full-state convergence so it can be repeated.

use super::{NextAction, Reconcile, finish, owner_name};
use crate::converge::create_or_patch;
use crate::error::{ControllerError, StepContext};
use crate::pipeline::{desired_ignition_secret, desired_server_claim, provider_id};
use crate::scope::{ClusterScope, ClusterScopeParams, MachineScope, MachineScopeParams};
use crds::{MachineStatusError, cluster_name_label, is_paused};
use futures::FutureExt;
use record_store::{RecordStore, StoreError};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconciles MetalMachine records.
pub struct MachineReconciler {
    store: Arc<dyn RecordStore>,
    requeue: Duration,
}

impl MachineReconciler {
    /// `requeue` is the fixed re-check delay used while a claim is unbound and during deletion.
    pub fn new(store: Arc<dyn RecordStore>, requeue: Duration) -> Self {
        Self { store, requeue }
    }

    async fn reconcile_normal(&self, scope: &mut MachineScope) -> Result<NextAction, ControllerError> {
        let namespace = scope.namespace().to_string();
        let name = scope.name().to_string();
        debug!("Reconciling MetalMachine {}/{}", namespace, name);

        if scope.has_failed() {
            info!("MetalMachine {}/{} has a terminal failure set, skipping", namespace, name);
            return Ok(NextAction::Done);
        }

        if scope.metal_machine.spec.image.trim().is_empty() {
            warn!("MetalMachine {}/{} has no image", namespace, name);
            scope.set_failure_reason(MachineStatusError::InvalidConfiguration);
            scope.set_failure_message("spec.image must name the OS image to provision");
            return Ok(NextAction::Done);
        }

        if !scope.cluster_scope.cluster.infrastructure_ready() {
            info!("Cluster infrastructure is not ready yet for MetalMachine {}/{}", namespace, name);
            return Ok(NextAction::Done);
        }

        let Some(bootstrap_name) = scope.machine.bootstrap_data_secret_name().map(str::to_string) else {
            info!("Bootstrap data secret reference is not yet available for MetalMachine {}/{}", namespace, name);
            return Ok(NextAction::Done);
        };

        // Must be persisted before anything is created on the machine's behalf.
        if scope.ensure_finalizer() {
            info!("Adding finalizer to MetalMachine {}/{}", namespace, name);
            scope.patch_object().await.step("add MetalMachine finalizer")?;
        }

        let bootstrap = self
            .store
            .get_secret(&namespace, &bootstrap_name)
            .await
            .step("get bootstrap secret")?
            .ok_or_else(|| ControllerError::Step {
                step: "get bootstrap secret",
                source: StoreError::NotFound(format!("Secret {namespace}/{bootstrap_name}")),
            })?;

        let ignition = desired_ignition_secret(&bootstrap, &name)?;
        let ignition_name = ignition.metadata.name.clone().unwrap_or_default();
        let (_, operation) = create_or_patch(self.store.as_ref(), &ignition)
            .await
            .step("apply ignition secret")?;
        debug!("Ignition secret {}/{} {}", namespace, ignition_name, operation);

        let desired_claim = desired_server_claim(&scope.metal_machine, &ignition_name)?;
        let (claim, operation) = create_or_patch(self.store.as_ref(), &desired_claim)
            .await
            .step("apply ServerClaim")?;
        debug!("ServerClaim {}/{} {}", namespace, name, operation);

        if !claim.is_bound() {
            info!("Waiting for ServerClaim {}/{} to be bound", namespace, name);
            if scope.is_ready() {
                scope.set_not_ready();
            }
            return Ok(NextAction::RequeueAfter(self.requeue));
        }

        if let Some(id) = provider_id(&claim) {
            if scope.set_provider_id(id.clone()) {
                info!("Setting providerID {} on MetalMachine {}/{}", id, namespace, name);
            }
        }
        scope.set_ready();

        Ok(NextAction::Done)
    }

    async fn reconcile_delete(&self, scope: &mut MachineScope) -> Result<NextAction, ControllerError> {
        if scope.remove_finalizer() {
            info!("Removing finalizer from MetalMachine {}/{}", scope.namespace(), scope.name());
        } else {
            debug!("MetalMachine {}/{} has no finalizer left", scope.namespace(), scope.name());
        }
        Ok(NextAction::RequeueAfter(self.requeue))
    }
}

#[async_trait::async_trait]
impl Reconcile for MachineReconciler {
    const NAME: &'static str = "metalmachine";

    async fn reconcile(&self, namespace: &str, name: &str) -> Result<NextAction, ControllerError> {
        let Some(metal_machine) = self
            .store
            .get_metal_machine(namespace, name)
            .await
            .step("get MetalMachine")?
        else {
            debug!("MetalMachine {}/{} not found, nothing to do", namespace, name);
            return Ok(NextAction::Done);
        };

        let Some(machine_name) = owner_name(&metal_machine.metadata, "Machine").map(str::to_string) else {
            info!("Waiting for Machine controller to set owner reference on MetalMachine {}/{}", namespace, name);
            return Ok(NextAction::Done);
        };

        let Some(machine) = self
            .store
            .get_machine(namespace, &machine_name)
            .await
            .step("get owner Machine")?
        else {
            info!("Owner Machine {}/{} of MetalMachine {} not found yet", namespace, machine_name, name);
            return Ok(NextAction::Done);
        };

        let Some(cluster_name) = cluster_name_label(&machine).map(str::to_string) else {
            info!("Machine {}/{} is missing the cluster-name label", namespace, machine_name);
            return Ok(NextAction::Done);
        };

        let Some(cluster) = self
            .store
            .get_cluster(namespace, &cluster_name)
            .await
            .step("get Cluster")?
        else {
            info!("Cluster {}/{} of MetalMachine {} not found yet", namespace, cluster_name, name);
            return Ok(NextAction::Done);
        };

        if is_paused(&cluster, &metal_machine) {
            info!("MetalMachine {}/{} or its Cluster is marked as paused, not reconciling", namespace, name);
            return Ok(NextAction::Done);
        }

        let Some(metal_cluster_name) = cluster.infrastructure_name().map(str::to_string) else {
            info!("Cluster {}/{} has no infrastructure reference yet", namespace, cluster_name);
            return Ok(NextAction::Done);
        };

        let metal_cluster = match self
            .store
            .get_metal_cluster(namespace, &metal_cluster_name)
            .await
            .step("get MetalCluster")?
        {
            Some(mc) if mc.status.as_ref().is_some_and(|s| s.ready) => mc,
            _ => {
                info!("MetalCluster {}/{} is not available or not ready yet", namespace, metal_cluster_name);
                return Ok(NextAction::Done);
            }
        };

        let cluster_scope = ClusterScope::new(ClusterScopeParams {
            store: Some(self.store.clone()),
            cluster: Some(cluster),
            metal_cluster: Some(metal_cluster),
        })?;
        let mut scope = MachineScope::new(MachineScopeParams {
            store: Some(self.store.clone()),
            cluster_scope: Some(cluster_scope),
            machine: Some(machine),
            metal_machine: Some(metal_machine),
        })?;

        let body = if scope.is_deleting() {
            AssertUnwindSafe(self.reconcile_delete(&mut scope)).catch_unwind().await
        } else {
            AssertUnwindSafe(self.reconcile_normal(&mut scope)).catch_unwind().await
        };
        let closed = scope.close().await;
        finish(body, closed, "commit MetalMachine")
    }
}
