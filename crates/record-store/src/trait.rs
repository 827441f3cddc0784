//! RecordStore trait for mocking
//!
//! The reconcilers only ever talk to the cluster through this trait. The
//! concrete [`KubeRecordStore`](crate::KubeRecordStore) implements it on top of
//! `kube::Api`, tests use [`MockRecordStore`](crate::MockRecordStore).
//!
//! Lookups return `Ok(None)` for absent records. Patches are JSON merge patches
//! (RFC 7386); a patch carrying `metadata.resourceVersion` fails with
//! [`StoreError::Conflict`] when the stored record has moved on.

use crate::error::StoreError;
use crds::{Cluster, Machine, MetalCluster, MetalMachine, ServerClaim};
use k8s_openapi::api::core::v1::Secret;
use serde_json::Value;

/// Trait for record store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    // Cluster API records (read-only)
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError>;
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>, StoreError>;

    // Infrastructure records
    async fn get_metal_cluster(&self, namespace: &str, name: &str) -> Result<Option<MetalCluster>, StoreError>;
    async fn patch_metal_cluster(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalCluster, StoreError>;
    async fn patch_metal_cluster_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalCluster, StoreError>;

    async fn get_metal_machine(&self, namespace: &str, name: &str) -> Result<Option<MetalMachine>, StoreError>;
    /// MetalMachines in `namespace` labelled with the given logical cluster name
    async fn list_metal_machines(&self, namespace: &str, cluster_name: &str) -> Result<Vec<MetalMachine>, StoreError>;
    async fn patch_metal_machine(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalMachine, StoreError>;
    async fn patch_metal_machine_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalMachine, StoreError>;

    // Secrets
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;
    async fn patch_secret(&self, namespace: &str, name: &str, patch: &Value) -> Result<Secret, StoreError>;

    // Server claims
    async fn get_server_claim(&self, namespace: &str, name: &str) -> Result<Option<ServerClaim>, StoreError>;
    async fn create_server_claim(&self, claim: &ServerClaim) -> Result<ServerClaim, StoreError>;
    async fn patch_server_claim(&self, namespace: &str, name: &str, patch: &Value) -> Result<ServerClaim, StoreError>;
}
