//! Unit tests for the cluster and machine scopes

#[cfg(test)]
mod tests {
    use crate::scope::{ClusterScope, ClusterScopeParams, MachineScope, MachineScopeParams, ScopeError};
    use crate::test_utils::*;
    use crds::{Cluster, Machine, MachineStatusError, MetalCluster, MetalMachine};
    use record_store::{RecordStore, WriteVerb};
    use serde_json::json;

    fn cluster_scope(env: &TestEnv) -> ClusterScope {
        ClusterScope::new(ClusterScopeParams {
            store: Some(env.store.clone()),
            cluster: env.mock.get::<Cluster>(NAMESPACE, CLUSTER_NAME),
            metal_cluster: env.mock.get::<MetalCluster>(NAMESPACE, METAL_CLUSTER_NAME),
        })
        .unwrap()
    }

    fn machine_scope(env: &TestEnv) -> MachineScope {
        MachineScope::new(MachineScopeParams {
            store: Some(env.store.clone()),
            cluster_scope: Some(cluster_scope(env)),
            machine: env.mock.get::<Machine>(NAMESPACE, MACHINE_NAME),
            metal_machine: env.mock.get::<MetalMachine>(NAMESPACE, METAL_MACHINE_NAME),
        })
        .unwrap()
    }

    #[test]
    fn test_cluster_scope_requires_every_reference() {
        let env = TestEnv::with_cluster();

        let err = ClusterScope::new(ClusterScopeParams::default()).unwrap_err();
        assert_eq!(err, ScopeError::MissingStore("ClusterScope"));

        let err = ClusterScope::new(ClusterScopeParams {
            store: Some(env.store.clone()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ScopeError::MissingCluster("ClusterScope"));

        let err = ClusterScope::new(ClusterScopeParams {
            store: Some(env.store.clone()),
            cluster: env.mock.get::<Cluster>(NAMESPACE, CLUSTER_NAME),
            metal_cluster: None,
        })
        .unwrap_err();
        assert_eq!(err, ScopeError::MissingMetalCluster("ClusterScope"));
    }

    #[test]
    fn test_machine_scope_requires_every_reference() {
        let env = TestEnv::provisioning();

        let err = MachineScope::new(MachineScopeParams {
            store: Some(env.store.clone()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(err, ScopeError::MissingClusterScope("MachineScope"));

        let err = MachineScope::new(MachineScopeParams {
            store: Some(env.store.clone()),
            cluster_scope: Some(cluster_scope(&env)),
            machine: env.mock.get::<Machine>(NAMESPACE, MACHINE_NAME),
            metal_machine: None,
        })
        .unwrap_err();
        assert_eq!(err, ScopeError::MissingMetalMachine("MachineScope"));
    }

    #[test]
    fn test_scope_rejects_unnamed_record() {
        let env = TestEnv::with_cluster();
        let mut metal_cluster = env.metal_cluster();
        metal_cluster.metadata.namespace = None;

        let err = ClusterScope::new(ClusterScopeParams {
            store: Some(env.store.clone()),
            cluster: env.mock.get::<Cluster>(NAMESPACE, CLUSTER_NAME),
            metal_cluster: Some(metal_cluster),
        })
        .unwrap_err();
        assert_eq!(
            err,
            ScopeError::MissingMetadata {
                kind: "MetalCluster",
                field: "namespace"
            }
        );
    }

    #[tokio::test]
    async fn test_close_without_changes_writes_nothing() {
        let env = TestEnv::provisioning();
        machine_scope(&env).close().await.unwrap();
        assert_eq!(env.mock.write_count(), 0);
    }

    #[tokio::test]
    async fn test_close_commits_once() {
        let env = TestEnv::provisioning();
        let mut scope = machine_scope(&env);
        scope.ensure_finalizer();
        scope.set_failure_reason(MachineStatusError::CreateError);
        scope.set_failure_message("no matching server");
        assert!(scope.has_failed());
        assert_eq!(env.mock.write_count(), 0);

        scope.close().await.unwrap();

        let verbs: Vec<WriteVerb> = env.mock.writes().iter().map(|w| w.verb).collect();
        assert_eq!(verbs, vec![WriteVerb::Patch, WriteVerb::PatchStatus]);
        let status = env.metal_machine().status.unwrap();
        assert_eq!(status.failure_reason.as_deref(), Some("CreateError"));
        assert_eq!(status.failure_message.as_deref(), Some("no matching server"));
    }

    #[tokio::test]
    async fn test_close_on_stale_record_conflicts() {
        let env = TestEnv::provisioning();
        let mut scope = machine_scope(&env);

        env.store
            .patch_metal_machine(NAMESPACE, METAL_MACHINE_NAME, &json!({ "spec": { "image": "newer" } }))
            .await
            .unwrap();

        scope.set_ready();
        let err = scope.close().await.unwrap_err();
        assert!(err.is_conflict());
        assert!(env.metal_machine().status.is_none());
    }

    #[tokio::test]
    async fn test_set_provider_id_only_once() {
        let env = TestEnv::provisioning();
        let mut scope = machine_scope(&env);

        assert!(scope.set_provider_id("metal://default/node-7".to_string()));
        assert!(!scope.set_provider_id("metal://default/other".to_string()));
        assert_eq!(scope.provider_id(), Some("metal://default/node-7"));
    }

    #[tokio::test]
    async fn test_patch_object_rebases_scope() {
        let env = TestEnv::with_cluster();
        let mut scope = cluster_scope(&env);
        scope.ensure_finalizer();
        scope.patch_object().await.unwrap();
        assert_eq!(env.mock.write_count(), 1);

        scope.set_ready();
        scope.close().await.unwrap();

        let verbs: Vec<WriteVerb> = env.mock.writes().iter().map(|w| w.verb).collect();
        assert_eq!(verbs, vec![WriteVerb::Patch, WriteVerb::PatchStatus]);
        assert!(env.metal_cluster().status.unwrap().ready);
    }
}
