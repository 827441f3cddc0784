//! ServerClaim projection

use crate::scope::ScopeError;
use crds::{LocalObjectReference, MetalMachine, Power, ServerClaim, ServerClaimSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

/// Claim for the server backing `metal_machine`
///
/// Named after the MetalMachine and owned by it, so at most one claim exists
/// per machine and it is collected together with it.
pub fn desired_server_claim(metal_machine: &MetalMachine, ignition_secret_name: &str) -> Result<ServerClaim, ScopeError> {
    let owner = metal_machine
        .controller_owner_ref(&())
        .ok_or(ScopeError::MissingMetadata { kind: "MetalMachine", field: "uid" })?;

    Ok(ServerClaim {
        metadata: ObjectMeta {
            name: metal_machine.metadata.name.clone(),
            namespace: metal_machine.metadata.namespace.clone(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        spec: ServerClaimSpec {
            power: Power::On,
            server_ref: None,
            server_selector: metal_machine.spec.server_selector.clone(),
            ignition_secret_ref: Some(LocalObjectReference::new(ignition_secret_name)),
            image: metal_machine.spec.image.clone(),
        },
        status: None,
    })
}
