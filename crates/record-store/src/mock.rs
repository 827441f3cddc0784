//! Mock RecordStore for unit testing
//!
//! In-memory implementation of [`RecordStore`] that behaves like the API server
//! for the operations the controllers use:
//!
//! - records get a uid and a resourceVersion on creation, the version moves on
//!   every effective write
//! - patches are JSON merge patches; `metadata.resourceVersion` in a patch is
//!   checked against the stored version
//! - kinds with a status subresource ignore `status` on the main endpoint and
//!   only accept `status` on the status endpoint
//! - a record marked for deletion is removed once its finalizers are gone, and
//!   removal cascades to records owning it through `ownerReferences`
//!
//! Every mutating call is recorded so tests can assert on write counts.

use crate::error::StoreError;
use crate::merge::apply_merge_patch;
use crate::store_trait::RecordStore;
use crds::{Cluster, Machine, MetalCluster, MetalMachine, ServerClaim, CLUSTER_NAME_LABEL};
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String, String);

/// Kind of a mutating call seen by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVerb {
    Create,
    Patch,
    PatchStatus,
}

/// One mutating call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub verb: WriteVerb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct MockState {
    objects: BTreeMap<Key, Value>,
    next_uid: u64,
    next_resource_version: u64,
    writes: Vec<WriteRecord>,
    failures: HashMap<String, String>,
}

/// Mock RecordStore for testing
#[derive(Debug, Clone, Default)]
pub struct MockRecordStore {
    state: Arc<Mutex<MockState>>,
}

fn key(kind: &str, namespace: &str, name: &str) -> Key {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

fn has_status_subresource(kind: &str) -> bool {
    kind != "Secret"
}

fn owner_uids(object: &Value) -> Vec<String> {
    object["metadata"]["ownerReferences"]
        .as_array()
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r["uid"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn has_finalizers(object: &Value) -> bool {
    object["metadata"]["finalizers"]
        .as_array()
        .is_some_and(|f| !f.is_empty())
}

fn is_deleting(object: &Value) -> bool {
    !object["metadata"]["deletionTimestamp"].is_null()
}

impl MockState {
    fn next_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("00000000-0000-0000-0000-{:012}", self.next_uid)
    }

    fn next_resource_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn take_failure(&mut self, method: &str) -> Result<(), StoreError> {
        match self.failures.remove(method) {
            Some(message) => Err(StoreError::Api(message)),
            None => Ok(()),
        }
    }

    fn insert(&mut self, kind: &str, mut object: Value) -> Result<Value, StoreError> {
        let namespace = object["metadata"]["namespace"]
            .as_str()
            .ok_or_else(|| StoreError::InvalidObject(format!("{kind} has no namespace")))?
            .to_string();
        let name = object["metadata"]["name"]
            .as_str()
            .ok_or_else(|| StoreError::InvalidObject(format!("{kind} has no name")))?
            .to_string();
        let k = key(kind, &namespace, &name);
        if self.objects.contains_key(&k) {
            return Err(StoreError::Conflict(format!("{kind} {namespace}/{name} already exists")));
        }

        if object["metadata"]["uid"].is_null() {
            object["metadata"]["uid"] = json!(self.next_uid());
        }
        object["metadata"]["resourceVersion"] = json!(self.next_resource_version());
        self.objects.insert(k, object.clone());
        Ok(object)
    }

    fn patch(&mut self, kind: &str, namespace: &str, name: &str, patch: &Value, status: bool) -> Result<Value, StoreError> {
        let k = key(kind, namespace, name);
        let Some(current) = self.objects.get(&k) else {
            return Err(StoreError::NotFound(format!("{kind} {namespace}/{name}")));
        };

        if let Some(expected) = patch["metadata"]["resourceVersion"].as_str() {
            if current["metadata"]["resourceVersion"].as_str() != Some(expected) {
                return Err(StoreError::Conflict(format!(
                    "{kind} {namespace}/{name} has been modified (expected resourceVersion {expected})"
                )));
            }
        }

        let mut effective = patch.clone();
        if let Value::Object(map) = &mut effective {
            if status {
                map.retain(|k, _| k == "status");
            } else if has_status_subresource(kind) {
                map.remove("status");
            }
        }

        let mut updated = current.clone();
        apply_merge_patch(&mut updated, &effective);
        for field in ["uid", "name", "namespace", "resourceVersion", "deletionTimestamp"] {
            updated["metadata"][field] = current["metadata"][field].clone();
        }
        if current["metadata"]["deletionTimestamp"].is_null() {
            if let Value::Object(meta) = &mut updated["metadata"] {
                meta.remove("deletionTimestamp");
            }
        }

        if updated != *current {
            updated["metadata"]["resourceVersion"] = json!(self.next_resource_version());
        }
        self.objects.insert(k.clone(), updated.clone());

        if is_deleting(&updated) && !has_finalizers(&updated) {
            self.remove(&k);
        }
        Ok(updated)
    }

    fn mark_deleted(&mut self, k: &Key) {
        let Some(object) = self.objects.get_mut(k) else {
            return;
        };
        if has_finalizers(object) {
            if object["metadata"]["deletionTimestamp"].is_null() {
                object["metadata"]["deletionTimestamp"] = json!("2026-01-01T00:00:00Z");
            }
        } else {
            self.remove(k);
        }
    }

    /// Removes a record and garbage-collects its dependents
    fn remove(&mut self, k: &Key) {
        let Some(object) = self.objects.remove(k) else {
            return;
        };
        let Some(uid) = object["metadata"]["uid"].as_str() else {
            return;
        };
        let dependents: Vec<Key> = self
            .objects
            .iter()
            .filter(|(_, o)| owner_uids(o).iter().any(|owner| owner == uid))
            .map(|(k, _)| k.clone())
            .collect();
        for dependent in dependents {
            self.mark_deleted(&dependent);
        }
    }
}

impl MockRecordStore {
    /// Create a new, empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a record of any kind to the mock store (for test setup)
    ///
    /// Assigns a uid if the record has none and returns the stored copy.
    pub fn add<K>(&self, obj: &K) -> K
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        let value = serde_json::to_value(obj).unwrap_or_default();
        let mut state = self.state();
        let k = key(
            &kind,
            value["metadata"]["namespace"].as_str().unwrap_or_default(),
            value["metadata"]["name"].as_str().unwrap_or_default(),
        );
        state.objects.remove(&k);
        let stored = state.insert(&kind, value).unwrap_or(Value::Null);
        serde_json::from_value(stored).unwrap_or_else(|e| panic!("mock stored an invalid {kind}: {e}"))
    }

    /// Current stored copy of a record, if any
    pub fn get<K>(&self, namespace: &str, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let state = self.state();
        state
            .objects
            .get(&key(&K::kind(&()), namespace, name))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether a record of the given type exists
    pub fn contains<K>(&self, namespace: &str, name: &str) -> bool
    where
        K: Resource<DynamicType = ()>,
    {
        self.state()
            .objects
            .contains_key(&key(&K::kind(&()), namespace, name))
    }

    /// Simulate a delete request: sets the deletion timestamp, or removes the
    /// record right away when it holds no finalizers
    pub fn mark_deleted<K>(&self, namespace: &str, name: &str)
    where
        K: Resource<DynamicType = ()>,
    {
        let k = key(&K::kind(&()), namespace, name);
        self.state().mark_deleted(&k);
    }

    /// Overwrite the status of a stored record, bypassing the write log
    ///
    /// Stands in for other controllers (the server-claim subsystem, Cluster API
    /// core) updating the records they own.
    pub fn set_status<K>(&self, namespace: &str, name: &str, status: Value)
    where
        K: Resource<DynamicType = ()>,
    {
        let mut state = self.state();
        let version = state.next_resource_version();
        if let Some(object) = state.objects.get_mut(&key(&K::kind(&()), namespace, name)) {
            object["status"] = status;
            object["metadata"]["resourceVersion"] = json!(version);
        }
    }

    /// Set the bind phase of a stored server claim
    pub fn set_server_claim_phase(&self, namespace: &str, name: &str, phase: &str) {
        self.set_status::<ServerClaim>(namespace, name, json!({ "phase": phase }));
    }

    /// Make the next call of `method` fail with [`StoreError::Api`]
    pub fn fail_next_call(&self, method: &str, message: &str) {
        self.state()
            .failures
            .insert(method.to_string(), message.to_string());
    }

    /// Mutating calls made so far
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    /// Number of mutating calls made so far
    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    /// Forget the recorded writes
    pub fn reset_writes(&self) {
        self.state().writes.clear();
    }

    fn lookup<K>(&self, method: &str, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let mut state = self.state();
        state.take_failure(method)?;
        state
            .objects
            .get(&key(&K::kind(&()), namespace, name))
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    fn create<K>(&self, method: &str, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        let mut state = self.state();
        state.take_failure(method)?;
        let mut value = serde_json::to_value(obj)?;
        if let Value::Object(meta) = &mut value["metadata"] {
            meta.remove("uid");
            meta.remove("resourceVersion");
        }
        if has_status_subresource(&kind) {
            if let Value::Object(map) = &mut value {
                map.remove("status");
            }
        }
        let stored = state.insert(&kind, value)?;
        state.writes.push(WriteRecord {
            verb: WriteVerb::Create,
            kind,
            namespace: stored["metadata"]["namespace"].as_str().unwrap_or_default().to_string(),
            name: stored["metadata"]["name"].as_str().unwrap_or_default().to_string(),
        });
        Ok(serde_json::from_value(stored)?)
    }

    fn patch<K>(&self, method: &str, namespace: &str, name: &str, patch: &Value, status: bool) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        let mut state = self.state();
        state.take_failure(method)?;
        state.writes.push(WriteRecord {
            verb: if status { WriteVerb::PatchStatus } else { WriteVerb::Patch },
            kind: kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        let updated = state.patch(&kind, namespace, name, patch, status)?;
        Ok(serde_json::from_value(updated)?)
    }
}

#[async_trait::async_trait]
impl RecordStore for MockRecordStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>, StoreError> {
        self.lookup("get_cluster", namespace, name)
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Option<Machine>, StoreError> {
        self.lookup("get_machine", namespace, name)
    }

    async fn get_metal_cluster(&self, namespace: &str, name: &str) -> Result<Option<MetalCluster>, StoreError> {
        self.lookup("get_metal_cluster", namespace, name)
    }

    async fn patch_metal_cluster(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalCluster, StoreError> {
        self.patch("patch_metal_cluster", namespace, name, patch, false)
    }

    async fn patch_metal_cluster_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalCluster, StoreError> {
        self.patch("patch_metal_cluster_status", namespace, name, patch, true)
    }

    async fn get_metal_machine(&self, namespace: &str, name: &str) -> Result<Option<MetalMachine>, StoreError> {
        self.lookup("get_metal_machine", namespace, name)
    }

    async fn list_metal_machines(&self, namespace: &str, cluster_name: &str) -> Result<Vec<MetalMachine>, StoreError> {
        let mut state = self.state();
        state.take_failure("list_metal_machines")?;
        let kind = MetalMachine::kind(&()).to_string();
        state
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, v)| v["metadata"]["labels"][CLUSTER_NAME_LABEL].as_str() == Some(cluster_name))
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(StoreError::from))
            .collect()
    }

    async fn patch_metal_machine(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalMachine, StoreError> {
        self.patch("patch_metal_machine", namespace, name, patch, false)
    }

    async fn patch_metal_machine_status(&self, namespace: &str, name: &str, patch: &Value) -> Result<MetalMachine, StoreError> {
        self.patch("patch_metal_machine_status", namespace, name, patch, true)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.lookup("get_secret", namespace, name)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.create("create_secret", secret)
    }

    async fn patch_secret(&self, namespace: &str, name: &str, patch: &Value) -> Result<Secret, StoreError> {
        self.patch("patch_secret", namespace, name, patch, false)
    }

    async fn get_server_claim(&self, namespace: &str, name: &str) -> Result<Option<ServerClaim>, StoreError> {
        self.lookup("get_server_claim", namespace, name)
    }

    async fn create_server_claim(&self, claim: &ServerClaim) -> Result<ServerClaim, StoreError> {
        self.create("create_server_claim", claim)
    }

    async fn patch_server_claim(&self, namespace: &str, name: &str, patch: &Value) -> Result<ServerClaim, StoreError> {
        self.patch("patch_server_claim", namespace, name, patch, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{MetalMachineSpec, MACHINE_FINALIZER};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn metal_machine(name: &str, cluster: &str) -> MetalMachine {
        MetalMachine {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                labels: Some(BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), cluster.to_string())])),
                ..Default::default()
            },
            spec: MetalMachineSpec {
                image: "img".to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let store = MockRecordStore::new();
        let stored = store.add(&metal_machine("m1", "c1"));
        let version = stored.metadata.resource_version.clone().unwrap();

        store
            .patch_metal_machine("default", "m1", &json!({ "spec": { "image": "new" } }))
            .await
            .unwrap();

        let err = store
            .patch_metal_machine(
                "default",
                "m1",
                &json!({ "metadata": { "resourceVersion": version }, "spec": { "image": "newer" } }),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_status_is_only_written_through_status_endpoint() {
        let store = MockRecordStore::new();
        store.add(&metal_machine("m1", "c1"));

        let patched = store
            .patch_metal_machine("default", "m1", &json!({ "status": { "ready": true } }))
            .await
            .unwrap();
        assert!(patched.status.is_none());

        let patched = store
            .patch_metal_machine_status(
                "default",
                "m1",
                &json!({ "spec": { "image": "ignored" }, "status": { "ready": true } }),
            )
            .await
            .unwrap();
        assert_eq!(patched.spec.image, "img");
        assert!(patched.status.unwrap().ready);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_finalizer_removal_completes_deletion_and_cascades() {
        let store = MockRecordStore::new();
        let mut machine = metal_machine("m1", "c1");
        machine.metadata.finalizers = Some(vec![MACHINE_FINALIZER.to_string()]);
        let machine = store.add(&machine);

        let claim = ServerClaim {
            metadata: ObjectMeta {
                name: Some("m1".to_string()),
                namespace: Some("default".to_string()),
                owner_references: Some(vec![OwnerReference {
                    api_version: "infrastructure.cluster.x-k8s.io/v1alpha1".to_string(),
                    kind: "MetalMachine".to_string(),
                    name: "m1".to_string(),
                    uid: machine.metadata.uid.clone().unwrap(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        };
        store.add(&claim);

        store.mark_deleted::<MetalMachine>("default", "m1");
        assert!(store.contains::<MetalMachine>("default", "m1"));

        store
            .patch_metal_machine("default", "m1", &json!({ "metadata": { "finalizers": [] } }))
            .await
            .unwrap();
        assert!(!store.contains::<MetalMachine>("default", "m1"));
        assert!(!store.contains::<ServerClaim>("default", "m1"));
    }

    #[tokio::test]
    async fn test_list_filters_by_cluster_label() {
        let store = MockRecordStore::new();
        store.add(&metal_machine("m1", "c1"));
        store.add(&metal_machine("m2", "c2"));

        let machines = store.list_metal_machines("default", "c1").await.unwrap();
        assert_eq!(machines.len(), 1);
        assert_eq!(machines[0].metadata.name.as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let store = MockRecordStore::new();
        store.add(&metal_machine("m1", "c1"));
        store.fail_next_call("get_metal_machine", "connection refused");

        assert!(matches!(
            store.get_metal_machine("default", "m1").await,
            Err(StoreError::Api(_))
        ));
        assert!(store.get_metal_machine("default", "m1").await.unwrap().is_some());
    }
}
