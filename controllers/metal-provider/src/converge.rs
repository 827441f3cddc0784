//! Create-or-patch convergence for derived records
//!
//! The desired record is computed in full on every pass. If the stored copy is
//! missing it is created; otherwise only the fields this controller owns are
//! diffed and brought in line with a single merge patch. Fields written by
//! other parties are left alone.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::api::core::v1::Secret;
use crds::ServerClaim;
use kube::Resource;
use record_store::{RecordStore, StoreError, merge_diff};
use serde_json::{Value, json};
use tracing::{debug, info};

/// Outcome of a create-or-patch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Created,
    Patched,
    Unchanged,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operation::Created => "created",
            Operation::Patched => "patched",
            Operation::Unchanged => "unchanged",
        })
    }
}

/// Records that can be converged through [`create_or_patch`]
#[async_trait::async_trait]
pub trait Convergent: Resource<DynamicType = ()> + Sized + Send + Sync {
    async fn fetch(store: &dyn RecordStore, namespace: &str, name: &str) -> Result<Option<Self>, StoreError>;
    async fn create(store: &dyn RecordStore, desired: &Self) -> Result<Self, StoreError>;
    async fn patch(store: &dyn RecordStore, namespace: &str, name: &str, patch: &Value) -> Result<Self, StoreError>;

    /// JSON view of the fields this controller owns on the record
    fn owned_fields(&self) -> Result<Value, StoreError>;
}

#[async_trait::async_trait]
impl Convergent for Secret {
    async fn fetch(store: &dyn RecordStore, namespace: &str, name: &str) -> Result<Option<Self>, StoreError> {
        store.get_secret(namespace, name).await
    }

    async fn create(store: &dyn RecordStore, desired: &Self) -> Result<Self, StoreError> {
        store.create_secret(desired).await
    }

    async fn patch(store: &dyn RecordStore, namespace: &str, name: &str, patch: &Value) -> Result<Self, StoreError> {
        store.patch_secret(namespace, name, patch).await
    }

    /// The whole data map: stray keys are removed on convergence
    fn owned_fields(&self) -> Result<Value, StoreError> {
        Ok(json!({ "data": serde_json::to_value(self.data.clone().unwrap_or_default())? }))
    }
}

#[async_trait::async_trait]
impl Convergent for ServerClaim {
    async fn fetch(store: &dyn RecordStore, namespace: &str, name: &str) -> Result<Option<Self>, StoreError> {
        store.get_server_claim(namespace, name).await
    }

    async fn create(store: &dyn RecordStore, desired: &Self) -> Result<Self, StoreError> {
        store.create_server_claim(desired).await
    }

    async fn patch(store: &dyn RecordStore, namespace: &str, name: &str, patch: &Value) -> Result<Self, StoreError> {
        store.patch_server_claim(namespace, name, patch).await
    }

    /// The projected spec fields; `serverRef` belongs to the server-claim subsystem
    fn owned_fields(&self) -> Result<Value, StoreError> {
        let mut spec = serde_json::to_value(&self.spec)?;
        if let Value::Object(map) = &mut spec {
            map.remove("serverRef");
        }
        Ok(json!({ "spec": spec }))
    }
}

/// Owner references `observed` must carry to match `desired`, if any are missing
fn missing_owners(desired: &ObjectMeta, observed: &ObjectMeta) -> Option<Vec<OwnerReference>> {
    let observed_refs = observed.owner_references.clone().unwrap_or_default();
    let missing: Vec<OwnerReference> = desired
        .owner_references
        .iter()
        .flatten()
        .filter(|wanted| !observed_refs.iter().any(|r| r.uid == wanted.uid))
        .cloned()
        .collect();

    if missing.is_empty() {
        return None;
    }
    let mut merged = observed_refs;
    merged.extend(missing);
    Some(merged)
}

/// Merge patch bringing `observed` in line with `desired`, or `None` when converged
pub fn convergence_patch<K: Convergent>(desired: &K, observed: &K) -> Result<Option<Value>, StoreError> {
    let mut patch = merge_diff(&observed.owned_fields()?, &desired.owned_fields()?);

    if let Some(owners) = missing_owners(desired.meta(), observed.meta()) {
        let patch = patch.get_or_insert_with(|| json!({}));
        patch["metadata"]["ownerReferences"] = serde_json::to_value(owners)?;
    }

    if let (Some(patch), Some(rv)) = (patch.as_mut(), observed.meta().resource_version.as_deref()) {
        patch["metadata"]["resourceVersion"] = json!(rv);
    }
    Ok(patch)
}

/// Creates `desired` if absent, otherwise patches the stored copy to match it
pub async fn create_or_patch<K: Convergent>(store: &dyn RecordStore, desired: &K) -> Result<(K, Operation), StoreError> {
    let kind = K::kind(&());
    let meta = desired.meta();
    let namespace = meta
        .namespace
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} has no namespace")))?;
    let name = meta
        .name
        .as_deref()
        .ok_or_else(|| StoreError::InvalidObject(format!("{kind} has no name")))?;

    let Some(observed) = K::fetch(store, namespace, name).await? else {
        let created = K::create(store, desired).await?;
        info!("Created {} {}/{}", kind, namespace, name);
        return Ok((created, Operation::Created));
    };

    match convergence_patch(desired, &observed)? {
        None => {
            debug!("{} {}/{} already converged", kind, namespace, name);
            Ok((observed, Operation::Unchanged))
        }
        Some(patch) => {
            let patched = K::patch(store, namespace, name, &patch).await?;
            info!("Patched {} {}/{}", kind, namespace, name);
            Ok((patched, Operation::Patched))
        }
    }
}
