//! MetalCluster scope

use super::{Patches, ScopeError, add_finalizer, compute_patches, remove_finalizer, tolerate_not_found, with_resource_version};
use crds::{
    CLUSTER_FINALIZER, CLUSTER_READY_CONDITION, Cluster, ConditionStatus, MetalCluster, MetalClusterStatus,
    READY_CONDITION, get_condition, mark_false, mark_true,
};
use record_store::{RecordStore, StoreError};
use std::sync::Arc;
use tracing::debug;

const SCOPE: &str = "ClusterScope";

/// Input parameters used to create a [`ClusterScope`]
#[derive(Default)]
pub struct ClusterScopeParams {
    pub store: Option<Arc<dyn RecordStore>>,
    pub cluster: Option<Cluster>,
    pub metal_cluster: Option<MetalCluster>,
}

/// Reconciliation context for one MetalCluster pass
pub struct ClusterScope {
    store: Arc<dyn RecordStore>,
    pub cluster: Cluster,
    pub metal_cluster: MetalCluster,
    baseline: MetalCluster,
}

impl std::fmt::Debug for ClusterScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterScope")
            .field("cluster", &self.cluster.metadata.name)
            .field("metal_cluster", &self.metal_cluster.metadata.name)
            .finish_non_exhaustive()
    }
}

impl ClusterScope {
    /// Creates a new scope; every parameter is required
    pub fn new(params: ClusterScopeParams) -> Result<Self, ScopeError> {
        let store = params.store.ok_or(ScopeError::MissingStore(SCOPE))?;
        let cluster = params.cluster.ok_or(ScopeError::MissingCluster(SCOPE))?;
        let metal_cluster = params.metal_cluster.ok_or(ScopeError::MissingMetalCluster(SCOPE))?;

        if metal_cluster.metadata.name.is_none() {
            return Err(ScopeError::MissingMetadata { kind: "MetalCluster", field: "name" });
        }
        if metal_cluster.metadata.namespace.is_none() {
            return Err(ScopeError::MissingMetadata { kind: "MetalCluster", field: "namespace" });
        }

        Ok(Self {
            store,
            baseline: metal_cluster.clone(),
            cluster,
            metal_cluster,
        })
    }

    /// Cluster API cluster name
    pub fn name(&self) -> &str {
        self.cluster.metadata.name.as_deref().unwrap_or_default()
    }

    /// Namespace of the MetalCluster
    pub fn namespace(&self) -> &str {
        self.metal_cluster.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn infra_cluster_name(&self) -> &str {
        self.metal_cluster.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        self.metal_cluster.status.as_ref().is_some_and(|s| s.ready)
    }

    pub fn is_deleting(&self) -> bool {
        self.metal_cluster.metadata.deletion_timestamp.is_some()
    }

    pub fn cluster_is_deleting(&self) -> bool {
        self.cluster.metadata.deletion_timestamp.is_some()
    }

    fn status_mut(&mut self) -> &mut MetalClusterStatus {
        self.metal_cluster.status.get_or_insert_with(Default::default)
    }

    pub fn set_ready(&mut self) {
        self.status_mut().ready = true;
    }

    pub fn set_not_ready(&mut self) {
        self.status_mut().ready = false;
    }

    pub fn mark_cluster_ready(&mut self) {
        mark_true(&mut self.status_mut().conditions, CLUSTER_READY_CONDITION);
    }

    /// Adds the cluster finalizer, returning whether it was missing
    pub fn ensure_finalizer(&mut self) -> bool {
        add_finalizer(&mut self.metal_cluster.metadata.finalizers, CLUSTER_FINALIZER)
    }

    /// Removes the cluster finalizer, returning whether it was present
    pub fn remove_finalizer(&mut self) -> bool {
        remove_finalizer(&mut self.metal_cluster.metadata.finalizers, CLUSTER_FINALIZER)
    }

    /// Mirrors `ClusterReady` into the summary `Ready` condition
    fn summarize(&mut self) {
        let Some(status) = self.metal_cluster.status.as_mut() else {
            return;
        };
        let Some(cluster_ready) = get_condition(&status.conditions, CLUSTER_READY_CONDITION).cloned() else {
            return;
        };
        match cluster_ready.status {
            ConditionStatus::True => {
                mark_true(&mut status.conditions, READY_CONDITION);
            }
            _ => {
                mark_false(
                    &mut status.conditions,
                    READY_CONDITION,
                    cluster_ready.reason.as_deref().unwrap_or("ClusterNotReady"),
                    cluster_ready.message.as_deref().unwrap_or_default(),
                );
            }
        }
    }

    /// Persists the accumulated changes now and rebases the scope on the result
    pub async fn patch_object(&mut self) -> Result<(), StoreError> {
        self.summarize();
        let patches = compute_patches(&self.baseline, &self.metal_cluster)?;
        if patches.is_empty() {
            debug!("MetalCluster {}/{} unchanged, nothing to commit", self.namespace(), self.infra_cluster_name());
            return Ok(());
        }
        self.commit(patches).await?;
        self.baseline = self.metal_cluster.clone();
        Ok(())
    }

    async fn commit(&mut self, patches: Patches) -> Result<(), StoreError> {
        let namespace = self.namespace().to_string();
        let name = self.infra_cluster_name().to_string();

        if let Some(patch) = patches.object {
            let patch = with_resource_version(patch, self.metal_cluster.metadata.resource_version.as_deref());
            let result = self.store.patch_metal_cluster(&namespace, &name, &patch).await;
            match tolerate_not_found(result)? {
                Some(updated) => self.metal_cluster.metadata.resource_version = updated.metadata.resource_version,
                None => {
                    debug!("MetalCluster {}/{} is gone, skipping status commit", namespace, name);
                    return Ok(());
                }
            }
        }
        if let Some(patch) = patches.status {
            let patch = with_resource_version(patch, self.metal_cluster.metadata.resource_version.as_deref());
            let result = self.store.patch_metal_cluster_status(&namespace, &name, &patch).await;
            if let Some(updated) = tolerate_not_found(result)? {
                self.metal_cluster.metadata.resource_version = updated.metadata.resource_version;
            }
        }
        Ok(())
    }

    /// Commits the accumulated changes once and ends the scope
    pub async fn close(mut self) -> Result<(), StoreError> {
        self.patch_object().await
    }
}
