//! Provider identity derivation

use crds::ServerClaim;

pub const PROVIDER_ID_PREFIX: &str = "metal://";

/// `metal://<claim-namespace>/<claim-name>`
pub fn provider_id(claim: &ServerClaim) -> Option<String> {
    let namespace = claim.metadata.namespace.as_deref()?;
    let name = claim.metadata.name.as_deref()?;
    Some(format!("{PROVIDER_ID_PREFIX}{namespace}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_provider_id_format() {
        let claim = ServerClaim {
            metadata: ObjectMeta {
                name: Some("node-7".to_string()),
                namespace: Some("metal".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        };
        assert_eq!(provider_id(&claim).as_deref(), Some("metal://metal/node-7"));
    }

    #[test]
    fn test_claim_without_namespace_has_no_identity() {
        let claim = ServerClaim::new("node-7", Default::default());
        assert_eq!(provider_id(&claim), None);
    }
}
