//! MetalMachine and MetalMachineTemplate CRDs
//!
//! A MetalMachine is the infrastructure side of a Cluster API `Machine`: it
//! names the OS image and the server selector, and once a physical server is
//! bound it carries the provider identity.

use crate::references::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Finalizer held on a MetalMachine while its external resources may still exist
pub const MACHINE_FINALIZER: &str = "metalmachine.infrastructure.cluster.x-k8s.io";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "MetalMachine",
    namespaced,
    status = "MetalMachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MetalMachineSpec {
    /// Unique identifier of the bound server, `metal://<namespace>/<claim-name>`
    ///
    /// Set once by the controller after the server claim is bound; never cleared.
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// OS image the server is booted with
    #[serde(default)]
    pub image: String,

    /// Matching criteria for labels on physical servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetalMachineStatus {
    /// Whether the machine infrastructure has been provisioned
    #[serde(default)]
    pub ready: bool,

    /// Terminal problem code, suitable for machine interpretation
    ///
    /// Only set for problems that need manual intervention (an invalid spec or
    /// a misconfigured controller), never for transient errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Terminal problem description, suitable for humans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

/// Cluster API machine status error codes used for `failureReason`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStatusError {
    InvalidConfiguration,
    UnsupportedChange,
    InsufficientResources,
    CreateError,
    UpdateError,
    DeleteError,
}

impl MachineStatusError {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineStatusError::InvalidConfiguration => "InvalidConfiguration",
            MachineStatusError::UnsupportedChange => "UnsupportedChange",
            MachineStatusError::InsufficientResources => "InsufficientResources",
            MachineStatusError::CreateError => "CreateError",
            MachineStatusError::UpdateError => "UpdateError",
            MachineStatusError::DeleteError => "DeleteError",
        }
    }
}

impl std::fmt::Display for MachineStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template from which Cluster API machine sets stamp out MetalMachines
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    kind = "MetalMachineTemplate",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct MetalMachineTemplateSpec {
    pub template: MetalMachineTemplateResource,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetalMachineTemplateResource {
    /// Labels and annotations copied onto generated MetalMachines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TemplateMeta>,

    pub spec: MetalMachineSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMeta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_uses_upstream_field_name() {
        let spec = MetalMachineSpec {
            provider_id: Some("metal://default/node-7".to_string()),
            image: "ghcr.io/ironcore-dev/os-images/gardenlinux:1443".to_string(),
            server_selector: None,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["providerID"], "metal://default/node-7");
        assert!(json.get("serverSelector").is_none());
    }

    #[test]
    fn test_status_accepts_missing_fields() {
        let status: MetalMachineStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(!status.ready);
        assert!(status.failure_reason.is_none());
        assert!(status.failure_message.is_none());
    }
}
