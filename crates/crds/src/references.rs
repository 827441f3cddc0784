//! Object references and selectors shared by the metal provider kinds
//!
//! These mirror the Kubernetes `ObjectReference`, `LocalObjectReference` and
//! `LabelSelector` shapes. They are defined here rather than taken from
//! k8s-openapi so that every CRD field carries a JSON schema.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to an object of any kind
///
/// Cluster API uses this shape for `spec.infrastructureRef` on `Cluster` and
/// `Machine`. Every field is optional on the wire; an empty name means the
/// reference has not been populated yet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    /// API version of the referent (e.g., "infrastructure.cluster.x-k8s.io/v1alpha1")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Kind of the referent (e.g., "MetalCluster")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the referent
    #[serde(default)]
    pub name: String,

    /// Namespace of the referent (defaults to the namespace of the referencing object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// UID of the referent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl ObjectReference {
    /// API group part of `apiVersion` ("" for the core group or when unset)
    pub fn api_group(&self) -> &str {
        group_of(self.api_version.as_deref().unwrap_or_default())
    }

    /// True when the reference points at `kind` in `group`
    pub fn refers_to(&self, group: &str, kind: &str) -> bool {
        self.kind.as_deref() == Some(kind) && self.api_group() == group
    }
}

/// Reference to an object in the same namespace, by name only
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Name of the referent
    pub name: String,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Label query over a set of physical servers
///
/// `matchLabels` and `matchExpressions` are ANDed. An empty selector matches
/// every server; the server-claim subsystem decides what that means.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Key/value pairs that must exist on a chosen server
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,

    /// Set-based requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based label requirement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    /// Label key the selector applies to
    pub key: String,

    /// One of In, NotIn, Exists, DoesNotExist
    pub operator: String,

    /// Values for In/NotIn; must be empty for Exists/DoesNotExist
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Endpoint used to reach a cluster's control plane
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    /// Hostname or IP of the endpoint
    #[serde(default)]
    pub host: String,

    /// Port of the endpoint
    #[serde(default)]
    pub port: i32,
}

impl ApiEndpoint {
    /// True when neither host nor port has been set
    pub fn is_zero(&self) -> bool {
        self.host.is_empty() && self.port == 0
    }
}

/// Extracts the group from an `apiVersion` string ("group/version" or "version")
pub fn group_of(api_version: &str) -> &str {
    match api_version.split_once('/') {
        Some((group, _)) => group,
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_of_core_and_named_groups() {
        assert_eq!(group_of("v1"), "");
        assert_eq!(group_of("cluster.x-k8s.io/v1beta1"), "cluster.x-k8s.io");
        assert_eq!(group_of(""), "");
    }

    #[test]
    fn test_refers_to_ignores_version() {
        let reference = ObjectReference {
            api_version: Some("cluster.x-k8s.io/v1beta1".to_string()),
            kind: Some("Machine".to_string()),
            name: "m-0".to_string(),
            ..Default::default()
        };
        assert!(reference.refers_to("cluster.x-k8s.io", "Machine"));
        assert!(!reference.refers_to("cluster.x-k8s.io", "Cluster"));
        assert!(!reference.refers_to("infrastructure.cluster.x-k8s.io", "Machine"));
    }

    #[test]
    fn test_label_selector_omits_empty_fields() {
        let selector = LabelSelector::default();
        let json = serde_json::to_value(&selector).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
