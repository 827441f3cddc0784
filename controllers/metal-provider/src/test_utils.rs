//! Test utilities for unit testing reconcilers
//!
//! This module provides helpers for creating test records and seeding a
//! `MockRecordStore` with a complete, ready-to-provision cluster.

#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::ByteString;
#[cfg(test)]
use k8s_openapi::api::core::v1::Secret;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
#[cfg(test)]
use kube::Resource;
#[cfg(test)]
use record_store::{MockRecordStore, RecordStore};
#[cfg(test)]
use std::collections::BTreeMap;
#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
pub const NAMESPACE: &str = "default";
#[cfg(test)]
pub const CLUSTER_NAME: &str = "c1";
#[cfg(test)]
pub const METAL_CLUSTER_NAME: &str = "c1-metal";
#[cfg(test)]
pub const MACHINE_NAME: &str = "c1-md-0";
#[cfg(test)]
pub const METAL_MACHINE_NAME: &str = "node-7";
#[cfg(test)]
pub const BOOTSTRAP_SECRET_NAME: &str = "c1-md-0-bootstrap";
#[cfg(test)]
pub const IMAGE: &str = "ghcr.io/ironcore-dev/os-images/gardenlinux:1443";
#[cfg(test)]
pub const PLACEHOLDER_PAYLOAD: &str = "host=%24%24%7BMETAL_HOSTNAME%7D";

/// Finalizer Cluster API core keeps on a Cluster until its children are gone
#[cfg(test)]
pub const CAPI_CLUSTER_FINALIZER: &str = "cluster.cluster.x-k8s.io";

#[cfg(test)]
fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
fn cluster_label() -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), CLUSTER_NAME.to_string())]))
}

/// Controller owner reference to a stored record (must carry a uid)
#[cfg(test)]
pub fn owner_ref<K: Resource<DynamicType = ()>>(owner: &K) -> OwnerReference {
    owner
        .controller_owner_ref(&())
        .expect("owner must have been added to the mock store")
}

/// Helper to create a test Cluster pointing at the MetalCluster
#[cfg(test)]
pub fn create_test_cluster(infrastructure_ready: bool) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            finalizers: Some(vec![CAPI_CLUSTER_FINALIZER.to_string()]),
            ..meta(CLUSTER_NAME)
        },
        spec: ClusterSpec {
            infrastructure_ref: Some(ObjectReference {
                api_version: Some(format!("{INFRASTRUCTURE_GROUP}/{INFRASTRUCTURE_VERSION}")),
                kind: Some("MetalCluster".to_string()),
                name: METAL_CLUSTER_NAME.to_string(),
                namespace: Some(NAMESPACE.to_string()),
                uid: None,
            }),
            ..Default::default()
        },
        status: Some(ClusterStatus {
            infrastructure_ready,
            ..Default::default()
        }),
    }
}

/// Helper to create a test MetalCluster, optionally owned by `cluster`
#[cfg(test)]
pub fn create_test_metal_cluster(owner: Option<&Cluster>) -> MetalCluster {
    MetalCluster {
        metadata: ObjectMeta {
            owner_references: owner.map(|c| vec![owner_ref(c)]),
            ..meta(METAL_CLUSTER_NAME)
        },
        spec: MetalClusterSpec::default(),
        status: None,
    }
}

/// Helper to create a test Machine with bootstrap data available
#[cfg(test)]
pub fn create_test_machine(bootstrap_secret: Option<&str>) -> Machine {
    Machine {
        metadata: ObjectMeta {
            labels: cluster_label(),
            ..meta(MACHINE_NAME)
        },
        spec: MachineSpec {
            cluster_name: CLUSTER_NAME.to_string(),
            bootstrap: Bootstrap {
                config_ref: None,
                data_secret_name: bootstrap_secret.map(str::to_string),
            },
            infrastructure_ref: ObjectReference {
                api_version: Some(format!("{INFRASTRUCTURE_GROUP}/{INFRASTRUCTURE_VERSION}")),
                kind: Some("MetalMachine".to_string()),
                name: METAL_MACHINE_NAME.to_string(),
                namespace: Some(NAMESPACE.to_string()),
                uid: None,
            },
            provider_id: None,
            version: Some("v1.30.2".to_string()),
        },
        status: None,
    }
}

/// Helper to create a test MetalMachine, optionally owned by `machine`
#[cfg(test)]
pub fn create_test_metal_machine(owner: Option<&Machine>, image: &str) -> MetalMachine {
    MetalMachine {
        metadata: ObjectMeta {
            labels: cluster_label(),
            owner_references: owner.map(|m| vec![owner_ref(m)]),
            ..meta(METAL_MACHINE_NAME)
        },
        spec: MetalMachineSpec {
            provider_id: None,
            image: image.to_string(),
            server_selector: Some(LabelSelector {
                match_labels: BTreeMap::from([("rack".to_string(), "r1".to_string())]),
                ..Default::default()
            }),
        },
        status: None,
    }
}

/// Helper to create a test bootstrap data secret holding `payload` under `value`
#[cfg(test)]
pub fn create_test_bootstrap_secret(payload: &str) -> Secret {
    Secret {
        metadata: meta(BOOTSTRAP_SECRET_NAME),
        data: Some(BTreeMap::from([(
            "value".to_string(),
            ByteString(payload.as_bytes().to_vec()),
        )])),
        type_: Some("cluster.x-k8s.io/secret".to_string()),
        ..Default::default()
    }
}

/// Records seeded into a mock store
#[cfg(test)]
pub struct TestEnv {
    pub mock: MockRecordStore,
    pub store: Arc<dyn RecordStore>,
}

#[cfg(test)]
impl TestEnv {
    /// Empty mock store
    pub fn empty() -> Self {
        let mock = MockRecordStore::new();
        let store: Arc<dyn RecordStore> = Arc::new(mock.clone());
        Self { mock, store }
    }

    /// Cluster and MetalCluster only; the MetalCluster is not ready yet
    pub fn with_cluster() -> Self {
        let env = Self::empty();
        let cluster = env.mock.add(&create_test_cluster(true));
        env.mock.add(&create_test_metal_cluster(Some(&cluster)));
        env
    }

    /// Complete cluster with one machine waiting to be provisioned
    ///
    /// The MetalCluster is ready and the Machine has bootstrap data whose
    /// payload carries the hostname placeholder.
    pub fn provisioning() -> Self {
        let env = Self::with_cluster();
        env.mock.set_status::<MetalCluster>(
            NAMESPACE,
            METAL_CLUSTER_NAME,
            serde_json::json!({ "ready": true }),
        );
        let machine = env.mock.add(&create_test_machine(Some(BOOTSTRAP_SECRET_NAME)));
        env.mock.add(&create_test_metal_machine(Some(&machine), IMAGE));
        env.mock.add(&create_test_bootstrap_secret(PLACEHOLDER_PAYLOAD));
        env
    }

    pub fn metal_cluster(&self) -> MetalCluster {
        self.mock
            .get(NAMESPACE, METAL_CLUSTER_NAME)
            .expect("MetalCluster should exist")
    }

    pub fn metal_machine(&self) -> MetalMachine {
        self.mock
            .get(NAMESPACE, METAL_MACHINE_NAME)
            .expect("MetalMachine should exist")
    }
}
