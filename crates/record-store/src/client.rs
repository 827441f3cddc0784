//! Kubernetes-backed record store

use crate::error::StoreError;
use crate::store_trait::RecordStore;
use crds::{Cluster, Machine, MetalCluster, MetalMachine, ServerClaim, CLUSTER_NAME_LABEL};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

/// Record store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeRecordStore {
    client: Client,
}

impl std::fmt::Debug for KubeRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRecordStore").finish_non_exhaustive()
    }
}

impl KubeRecordStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying Kubernetes client, shared with the watchers
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn create<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
    {
        let namespace = obj
            .meta()
            .namespace
            .as_deref()
            .ok_or_else(|| StoreError::InvalidObject(format!("{} has no namespace", K::kind(&()))))?;
        debug!("Creating {} {}/{}", K::kind(&()), namespace, obj.meta().name.as_deref().unwrap_or_default());
        Ok(self.api::<K>(namespace).create(&PostParams::default(), obj).await?)
    }

    async fn patch<K>(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        debug!("Patching {} {}/{}: {}", K::kind(&()), namespace, name, patch);
        Ok(self
            .api::<K>(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn patch_status<K>(&self, namespace: &str, name: &str, patch: &Value) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + Clone + DeserializeOwned + Debug,
    {
        debug!("Patching {} {}/{} status: {}", K::kind(&()), namespace, name, patch);
        Ok(self
            .api::<K>(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }
}

#[async_trait::async_trait]
impl RecordStore for KubeRecordStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError> {
        self.get(namespace, name).await
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>, StoreError> {
        self.get(namespace, name).await
    }

    async fn get_metal_cluster(&self, namespace: &str, name: &str) -> Result<Option<MetalCluster>, StoreError> {
        self.get(namespace, name).await
    }

    async fn patch_metal_cluster(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalCluster, StoreError> {
        self.patch(namespace, name, patch).await
    }

    async fn patch_metal_cluster_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalCluster, StoreError> {
        self.patch_status(namespace, name, patch).await
    }

    async fn get_metal_machine(&self, namespace: &str, name: &str) -> Result<Option<MetalMachine>, StoreError> {
        self.get(namespace, name).await
    }

    async fn list_metal_machines(&self, namespace: &str, cluster_name: &str) -> Result<Vec<MetalMachine>, StoreError> {
        let params = ListParams::default().labels(&format!("{CLUSTER_NAME_LABEL}={cluster_name}"));
        let list = self.api::<MetalMachine>(namespace).list(&params).await?;
        Ok(list.items)
    }

    async fn patch_metal_machine(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalMachine, StoreError> {
        self.patch(namespace, name, patch).await
    }

    async fn patch_metal_machine_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalMachine, StoreError> {
        self.patch_status(namespace, name, patch).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.get(namespace, name).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.create(secret).await
    }

    async fn patch_secret(&self, namespace: &str, name: &str, patch: &Value) -> Result<Secret, StoreError> {
        self.patch(namespace, name, patch).await
    }

    async fn get_server_claim(&self, namespace: &str, name: &str) -> Result<Option<ServerClaim>, StoreError> {
        self.get(namespace, name).await
    }

    async fn create_server_claim(&self, claim: &ServerClaim) -> Result<ServerClaim, StoreError> {
        self.create(claim).await
    }

    async fn patch_server_claim(&self, namespace: &str, name: &str, patch: &Value) -> Result<ServerClaim, StoreError> {
        self.patch(namespace, name, patch).await
    }
}
