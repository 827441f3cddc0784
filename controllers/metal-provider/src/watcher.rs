//! Kubernetes resource watchers.
//!
//! This module wires the reconcilers into `kube_runtime::Controller`, which
//! provides the event queue, single-flight per key, reconnection and requeue
//! scheduling. The reconcilers only ever see a record key.

use crate::backoff::BackoffTracker;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::{ClusterReconciler, MachineReconciler, Reconcile};
use crds::{Cluster, INFRASTRUCTURE_GROUP, Machine, MetalCluster, MetalMachine, ServerClaim};
use futures::StreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Shared state handed to every reconcile invocation
pub struct Context<R> {
    pub reconciler: R,
    pub backoff: BackoffTracker,
    pub metrics: Arc<Metrics>,
}

impl<R> Context<R> {
    pub fn new(reconciler: R, config: &ControllerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            reconciler,
            backoff: BackoffTracker::new(config.error_backoff_min_seconds, config.error_backoff_max_seconds),
            metrics,
        }
    }
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!(
        "{}/{}",
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    )
}

/// Reconcile callback: hands the key to the reconciler and records the outcome
async fn reconcile<K, R>(obj: Arc<K>, ctx: Arc<Context<R>>) -> Result<Action, ControllerError>
where
    K: Resource,
    R: Reconcile,
{
    let namespace = obj.meta().namespace.clone().unwrap_or_default();
    let name = obj.meta().name.clone().unwrap_or_default();
    debug!("Reconciling {} {}/{}", R::NAME, namespace, name);

    let started = Instant::now();
    let result = ctx.reconciler.reconcile(&namespace, &name).await;
    let outcome = match &result {
        Ok(next) => next.outcome(),
        Err(_) => "error",
    };
    ctx.metrics.record(R::NAME, outcome, started.elapsed());

    let next = result?;
    ctx.backoff.reset(&object_key(obj.as_ref()));
    Ok(next.into())
}

/// Error policy: per-key Fibonacci backoff, reset on the next successful pass
fn error_policy<K, R>(obj: Arc<K>, err: &ControllerError, ctx: Arc<Context<R>>) -> Action
where
    K: Resource,
    R: Reconcile,
{
    let key = object_key(obj.as_ref());
    let delay = ctx.backoff.next_delay(&key);
    error!("Reconciliation of {} {} failed, retrying in {:?}: {}", R::NAME, key, delay, err);
    Action::requeue(delay)
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn runtime_config(config: &ControllerConfig) -> RuntimeConfig {
    RuntimeConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency)
}

/// Maps a Cluster to the MetalCluster it references, if any
fn metal_cluster_for(cluster: Cluster) -> Option<ObjectRef<MetalCluster>> {
    let reference = cluster.spec.infrastructure_ref.as_ref()?;
    if !reference.refers_to(INFRASTRUCTURE_GROUP, "MetalCluster") || reference.name.is_empty() {
        return None;
    }
    let namespace = reference.namespace.clone().or_else(|| cluster.namespace())?;
    Some(ObjectRef::new(&reference.name).within(&namespace))
}

/// Maps a Machine to the MetalMachine it references, if any
fn metal_machine_for(machine: Machine) -> Option<ObjectRef<MetalMachine>> {
    let reference = &machine.spec.infrastructure_ref;
    if !reference.refers_to(INFRASTRUCTURE_GROUP, "MetalMachine") || reference.name.is_empty() {
        return None;
    }
    let namespace = reference.namespace.clone().or_else(|| machine.namespace())?;
    Some(ObjectRef::new(&reference.name).within(&namespace))
}

/// Runs the MetalCluster controller until shutdown.
///
/// Also watches Cluster API `Cluster` records so pausing, deletion and
/// owner changes re-trigger the referenced MetalCluster.
pub async fn watch_metal_clusters(
    client: Client,
    config: ControllerConfig,
    ctx: Arc<Context<ClusterReconciler>>,
) -> Result<(), ControllerError> {
    info!("Starting MetalCluster watcher");
    let namespace = config.namespace.as_deref();

    Controller::new(api::<MetalCluster>(&client, namespace), watcher::Config::default())
        .watches(api::<Cluster>(&client, namespace), watcher::Config::default(), metal_cluster_for)
        .with_config(runtime_config(&config))
        .shutdown_on_signal()
        .run(reconcile::<MetalCluster, ClusterReconciler>, error_policy::<MetalCluster, ClusterReconciler>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled MetalCluster {}", obj),
                Err(e) => error!("MetalCluster controller error: {}", e),
            }
        })
        .await;

    info!("MetalCluster watcher stopped");
    Ok(())
}

/// Runs the MetalMachine controller until shutdown.
///
/// Owns `ServerClaim` records (bind phase changes re-trigger the machine) and
/// watches Cluster API `Machine` records for bootstrap data becoming available.
pub async fn watch_metal_machines(
    client: Client,
    config: ControllerConfig,
    ctx: Arc<Context<MachineReconciler>>,
) -> Result<(), ControllerError> {
    info!("Starting MetalMachine watcher");
    let namespace = config.namespace.as_deref();

    Controller::new(api::<MetalMachine>(&client, namespace), watcher::Config::default())
        .owns(api::<ServerClaim>(&client, namespace), watcher::Config::default())
        .watches(api::<Machine>(&client, namespace), watcher::Config::default(), metal_machine_for)
        .with_config(runtime_config(&config))
        .shutdown_on_signal()
        .run(reconcile::<MetalMachine, MachineReconciler>, error_policy::<MetalMachine, MachineReconciler>, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled MetalMachine {}", obj),
                Err(e) => error!("MetalMachine controller error: {}", e),
            }
        })
        .await;

    info!("MetalMachine watcher stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_cluster_maps_to_referenced_metal_cluster() {
        let cluster = create_test_cluster(true);
        let target = metal_cluster_for(cluster).expect("should map");
        assert_eq!(target.name, METAL_CLUSTER_NAME);
        assert_eq!(target.namespace.as_deref(), Some(NAMESPACE));
    }

    #[test]
    fn test_cluster_with_foreign_infrastructure_is_ignored() {
        let mut cluster = create_test_cluster(true);
        if let Some(reference) = cluster.spec.infrastructure_ref.as_mut() {
            reference.kind = Some("AWSCluster".to_string());
        }
        assert!(metal_cluster_for(cluster).is_none());
    }

    #[test]
    fn test_machine_reference_defaults_to_machine_namespace() {
        let mut machine = create_test_machine(None);
        machine.spec.infrastructure_ref.namespace = None;
        machine.metadata = ObjectMeta {
            namespace: Some("metal".to_string()),
            ..machine.metadata
        };
        let target = metal_machine_for(machine).expect("should map");
        assert_eq!(target.name, METAL_MACHINE_NAME);
        assert_eq!(target.namespace.as_deref(), Some("metal"));
    }

    #[test]
    fn test_object_key() {
        let metal_machine = create_test_metal_machine(None, IMAGE);
        assert_eq!(object_key(&metal_machine), "default/node-7");
    }
}
