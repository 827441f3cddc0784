//! MetalMachine scope

use super::{ClusterScope, Patches, ScopeError, add_finalizer, compute_patches, remove_finalizer, tolerate_not_found, with_resource_version};
use crds::{MACHINE_FINALIZER, Machine, MachineStatusError, MetalMachine, MetalMachineStatus};
use record_store::{RecordStore, StoreError};
use std::sync::Arc;
use tracing::debug;

const SCOPE: &str = "MachineScope";

/// Input parameters used to create a [`MachineScope`]
#[derive(Default)]
pub struct MachineScopeParams {
    pub store: Option<Arc<dyn RecordStore>>,
    pub cluster_scope: Option<ClusterScope>,
    pub machine: Option<Machine>,
    pub metal_machine: Option<MetalMachine>,
}

/// Reconciliation context for one MetalMachine pass
///
/// Carries the cluster scope read-only; only the MetalMachine is committed on
/// close.
pub struct MachineScope {
    store: Arc<dyn RecordStore>,
    pub cluster_scope: ClusterScope,
    pub machine: Machine,
    pub metal_machine: MetalMachine,
    baseline: MetalMachine,
}

impl std::fmt::Debug for MachineScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineScope")
            .field("machine", &self.machine.metadata.name)
            .field("metal_machine", &self.metal_machine.metadata.name)
            .finish_non_exhaustive()
    }
}

impl MachineScope {
    /// Creates a new scope; every parameter is required
    pub fn new(params: MachineScopeParams) -> Result<Self, ScopeError> {
        let store = params.store.ok_or(ScopeError::MissingStore(SCOPE))?;
        let cluster_scope = params.cluster_scope.ok_or(ScopeError::MissingClusterScope(SCOPE))?;
        let machine = params.machine.ok_or(ScopeError::MissingMachine(SCOPE))?;
        let metal_machine = params.metal_machine.ok_or(ScopeError::MissingMetalMachine(SCOPE))?;

        if metal_machine.metadata.name.is_none() {
            return Err(ScopeError::MissingMetadata { kind: "MetalMachine", field: "name" });
        }
        if metal_machine.metadata.namespace.is_none() {
            return Err(ScopeError::MissingMetadata { kind: "MetalMachine", field: "namespace" });
        }

        Ok(Self {
            store,
            cluster_scope,
            machine,
            baseline: metal_machine.clone(),
            metal_machine,
        })
    }

    /// MetalMachine name, also the name of its ServerClaim and the hostname of the server
    pub fn name(&self) -> &str {
        self.metal_machine.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metal_machine.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn is_deleting(&self) -> bool {
        self.metal_machine.metadata.deletion_timestamp.is_some()
    }

    /// Whether a terminal failure has been recorded on the MetalMachine
    pub fn has_failed(&self) -> bool {
        self.metal_machine
            .status
            .as_ref()
            .is_some_and(|s| s.failure_reason.is_some() || s.failure_message.is_some())
    }

    pub fn is_ready(&self) -> bool {
        self.metal_machine.status.as_ref().is_some_and(|s| s.ready)
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.metal_machine.spec.provider_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Sets the provider identity unless one is already present; returns whether it was set
    pub fn set_provider_id(&mut self, provider_id: String) -> bool {
        if self.provider_id().is_some() {
            return false;
        }
        self.metal_machine.spec.provider_id = Some(provider_id);
        true
    }

    fn status_mut(&mut self) -> &mut MetalMachineStatus {
        self.metal_machine.status.get_or_insert_with(Default::default)
    }

    pub fn set_ready(&mut self) {
        self.status_mut().ready = true;
    }

    pub fn set_not_ready(&mut self) {
        self.status_mut().ready = false;
    }

    pub fn set_failure_reason(&mut self, reason: MachineStatusError) {
        self.status_mut().failure_reason = Some(reason.to_string());
    }

    pub fn set_failure_message(&mut self, message: impl Into<String>) {
        self.status_mut().failure_message = Some(message.into());
    }

    /// Adds the machine finalizer, returning whether it was missing
    pub fn ensure_finalizer(&mut self) -> bool {
        add_finalizer(&mut self.metal_machine.metadata.finalizers, MACHINE_FINALIZER)
    }

    /// Removes the machine finalizer, returning whether it was present
    pub fn remove_finalizer(&mut self) -> bool {
        remove_finalizer(&mut self.metal_machine.metadata.finalizers, MACHINE_FINALIZER)
    }

    /// Persists the accumulated changes now and rebases the scope on the result
    ///
    /// Used where a change must be durable before the pass goes on, such as
    /// the finalizer ahead of creating external resources.
    pub async fn patch_object(&mut self) -> Result<(), StoreError> {
        let patches = compute_patches(&self.baseline, &self.metal_machine)?;
        if patches.is_empty() {
            debug!("MetalMachine {}/{} unchanged, nothing to commit", self.namespace(), self.name());
            return Ok(());
        }
        self.commit(patches).await?;
        self.baseline = self.metal_machine.clone();
        Ok(())
    }

    async fn commit(&mut self, patches: Patches) -> Result<(), StoreError> {
        let namespace = self.namespace().to_string();
        let name = self.name().to_string();

        if let Some(patch) = patches.object {
            let patch = with_resource_version(patch, self.metal_machine.metadata.resource_version.as_deref());
            let result = self.store.patch_metal_machine(&namespace, &name, &patch).await;
            match tolerate_not_found(result)? {
                Some(updated) => self.metal_machine.metadata.resource_version = updated.metadata.resource_version,
                None => {
                    debug!("MetalMachine {}/{} is gone, skipping status commit", namespace, name);
                    return Ok(());
                }
            }
        }
        if let Some(patch) = patches.status {
            let patch = with_resource_version(patch, self.metal_machine.metadata.resource_version.as_deref());
            let result = self.store.patch_metal_machine_status(&namespace, &name, &patch).await;
            if let Some(updated) = tolerate_not_found(result)? {
                self.metal_machine.metadata.resource_version = updated.metadata.resource_version;
            }
        }
        Ok(())
    }

    /// Commits the accumulated changes once and ends the scope
    pub async fn close(mut self) -> Result<(), StoreError> {
        self.patch_object().await
    }
}
