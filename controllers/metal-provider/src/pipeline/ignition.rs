//! Boot data templating
//!
//! The bootstrap provider renders a payload under the `value` key of the
//! bootstrap secret. Before handing it to the server it gets the machine's
//! hostname substituted in, and it is stored in a derived secret under the
//! `ignition` key.

use crate::error::ControllerError;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;

/// Percent-encoded `$${METAL_HOSTNAME}`
pub const HOSTNAME_PLACEHOLDER: &str = "%24%24%7BMETAL_HOSTNAME%7D";

/// Key of the payload in the bootstrap secret
pub const BOOTSTRAP_DATA_KEY: &str = "value";

/// Key of the payload in the derived secret
pub const IGNITION_DATA_KEY: &str = "ignition";

pub fn ignition_secret_name(bootstrap_secret_name: &str) -> String {
    format!("ignition-{bootstrap_secret_name}")
}

/// Replaces every occurrence of the hostname placeholder with `hostname`
///
/// Works on raw bytes; a payload without the placeholder is returned unchanged.
pub fn substitute_hostname(payload: &[u8], hostname: &str) -> Vec<u8> {
    let needle = HOSTNAME_PLACEHOLDER.as_bytes();
    let mut out = Vec::with_capacity(payload.len());
    let mut rest = payload;

    while let Some(pos) = rest.windows(needle.len()).position(|window| window == needle) {
        out.extend_from_slice(&rest[..pos]);
        out.extend_from_slice(hostname.as_bytes());
        rest = &rest[pos + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}

/// Derived ignition secret for `machine_name`, owned by the bootstrap secret
pub fn desired_ignition_secret(bootstrap: &Secret, machine_name: &str) -> Result<Secret, ControllerError> {
    let bootstrap_name = bootstrap
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::BootstrapData("bootstrap secret has no name".to_string()))?;

    let payload = bootstrap
        .data
        .as_ref()
        .and_then(|data| data.get(BOOTSTRAP_DATA_KEY))
        .ok_or_else(|| {
            ControllerError::BootstrapData(format!(
                "bootstrap secret {bootstrap_name} has no '{BOOTSTRAP_DATA_KEY}' key"
            ))
        })?;

    let owner = bootstrap.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::BootstrapData(format!("bootstrap secret {bootstrap_name} has no uid"))
    })?;

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(ignition_secret_name(bootstrap_name)),
            namespace: bootstrap.metadata.namespace.clone(),
            owner_references: Some(vec![owner]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            IGNITION_DATA_KEY.to_string(),
            ByteString(substitute_hostname(&payload.0, machine_name)),
        )])),
        ..Default::default()
    })
}
