//! ServerClaim kind of the server-claim subsystem
//!
//! A ServerClaim asks the bare-metal operator for one physical server matching
//! a selector, booted with an image and ignition data. The operator matches a
//! server and reports the binding through `status.phase`.

use crate::references::{LabelSelector, LocalObjectReference};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "metal.ironcore.dev",
    version = "v1alpha1",
    kind = "ServerClaim",
    namespaced,
    status = "ServerClaimStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimSpec {
    /// Desired power state of the claimed server
    #[serde(default)]
    pub power: Power,

    /// Server bound to this claim; written by the server-claim subsystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ref: Option<LocalObjectReference>,

    /// Label query used to pick a server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_selector: Option<LabelSelector>,

    /// Secret holding the ignition data for the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_secret_ref: Option<LocalObjectReference>,

    /// OS image to boot
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Power {
    #[default]
    On,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ServerClaimPhase>,
}

/// Bind phase of a claim
///
/// Phases this provider does not know about deserialize as `Unknown` and are
/// handled like `Unbound`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ServerClaimPhase {
    Bound,
    Unbound,
    #[serde(other)]
    Unknown,
}

impl ServerClaim {
    /// Whether a physical server has been matched and attached to this claim
    pub fn is_bound(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .is_some_and(|phase| phase == ServerClaimPhase::Bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_phase_is_not_bound() {
        let status: ServerClaimStatus =
            serde_json::from_value(serde_json::json!({ "phase": "Reserved" })).unwrap();
        assert_eq!(status.phase, Some(ServerClaimPhase::Unknown));

        let claim = ServerClaim {
            metadata: Default::default(),
            spec: Default::default(),
            status: Some(status),
        };
        assert!(!claim.is_bound());
    }

    #[test]
    fn test_bound_phase() {
        let claim = ServerClaim {
            metadata: Default::default(),
            spec: Default::default(),
            status: Some(ServerClaimStatus {
                phase: Some(ServerClaimPhase::Bound),
            }),
        };
        assert!(claim.is_bound());
    }

    #[test]
    fn test_power_defaults_on() {
        let spec: ServerClaimSpec = serde_json::from_value(serde_json::json!({ "image": "img" })).unwrap();
        assert_eq!(spec.power, Power::On);
        assert_eq!(serde_json::to_value(spec.power).unwrap(), "On");
    }
}
