//! MetalCluster CRD
//!
//! Infrastructure counterpart of a Cluster API `Cluster`. It is the gate every
//! machine of the cluster waits on: no machine work starts until
//! `status.ready` is true.

use crate::conditions::Condition;
use crate::references::ApiEndpoint;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer held on a MetalCluster until every MetalMachine of the cluster is gone
pub const CLUSTER_FINALIZER: &str = "metalcluster.infrastructure.cluster.x-k8s.io";

/// Condition type reporting the cluster infrastructure state
pub const CLUSTER_READY_CONDITION: &str = "ClusterReady";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "MetalCluster",
    namespaced,
    status = "MetalClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MetalClusterSpec {
    /// Endpoint used to communicate with the control plane
    #[serde(default, skip_serializing_if = "ApiEndpoint::is_zero")]
    pub control_plane_endpoint: ApiEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetalClusterStatus {
    /// Whether the cluster infrastructure is ready
    #[serde(default)]
    pub ready: bool,

    /// Current service state of the MetalCluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}
