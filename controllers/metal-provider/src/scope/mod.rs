//! Per-pass reconciliation scopes
//!
//! A scope owns the in-memory copy of the infrastructure record being
//! reconciled plus a baseline snapshot taken when it was read. Mutators only
//! touch the in-memory copy; [`ClusterScope::close`] and
//! [`MachineScope::close`] diff it against the baseline and commit the result
//! once, as a metadata/spec merge patch followed by a status merge patch.

mod cluster;
mod machine;
#[cfg(test)]
mod scope_test;

pub use cluster::{ClusterScope, ClusterScopeParams};
pub use machine::{MachineScope, MachineScopeParams};

use record_store::{StoreError, merge_diff};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors raised while building a scope
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("record store is required when creating a {0}")]
    MissingStore(&'static str),

    #[error("Cluster is required when creating a {0}")]
    MissingCluster(&'static str),

    #[error("MetalCluster is required when creating a {0}")]
    MissingMetalCluster(&'static str),

    #[error("Machine is required when creating a {0}")]
    MissingMachine(&'static str),

    #[error("MetalMachine is required when creating a {0}")]
    MissingMetalMachine(&'static str),

    #[error("ClusterScope is required when creating a {0}")]
    MissingClusterScope(&'static str),

    #[error("{kind} has no {field}")]
    MissingMetadata {
        kind: &'static str,
        field: &'static str,
    },
}

/// Metadata fields a scope may change on its record
const OWNED_METADATA: &[&str] = &["finalizers", "labels", "annotations"];

/// Pending changes of a scoped record
#[derive(Debug, Default, PartialEq)]
pub(crate) struct Patches {
    /// Merge patch for metadata and spec (main endpoint)
    pub object: Option<Value>,
    /// Merge patch for status (status endpoint)
    pub status: Option<Value>,
}

impl Patches {
    pub fn is_empty(&self) -> bool {
        self.object.is_none() && self.status.is_none()
    }
}

fn object_view(value: &Value) -> Value {
    let mut metadata = Map::new();
    for field in OWNED_METADATA {
        if let Some(v) = value["metadata"].get(*field) {
            metadata.insert((*field).to_string(), v.clone());
        }
    }
    let mut view = Map::new();
    view.insert("metadata".to_string(), Value::Object(metadata));
    if let Some(spec) = value.get("spec") {
        view.insert("spec".to_string(), spec.clone());
    }
    Value::Object(view)
}

fn status_view(value: &Value) -> Value {
    match value.get("status") {
        Some(status) => json!({ "status": status }),
        None => json!({}),
    }
}

/// Splits the changes from `baseline` to `current` into object and status patches
pub(crate) fn compute_patches<K: Serialize>(baseline: &K, current: &K) -> Result<Patches, StoreError> {
    let baseline = serde_json::to_value(baseline)?;
    let current = serde_json::to_value(current)?;

    Ok(Patches {
        object: merge_diff(&object_view(&baseline), &object_view(&current)),
        status: merge_diff(&status_view(&baseline), &status_view(&current)),
    })
}

/// Adds an optimistic concurrency precondition to a merge patch
pub(crate) fn with_resource_version(mut patch: Value, resource_version: Option<&str>) -> Value {
    if let Some(rv) = resource_version {
        patch["metadata"]["resourceVersion"] = json!(rv);
    }
    patch
}

/// Adds `finalizer` to the list, returning whether it was missing
pub(crate) fn add_finalizer(finalizers: &mut Option<Vec<String>>, finalizer: &str) -> bool {
    let list = finalizers.get_or_insert_with(Vec::new);
    if list.iter().any(|f| f == finalizer) {
        return false;
    }
    list.push(finalizer.to_string());
    true
}

/// Removes `finalizer` from the list, returning whether it was present
pub(crate) fn remove_finalizer(finalizers: &mut Option<Vec<String>>, finalizer: &str) -> bool {
    let Some(list) = finalizers else {
        return false;
    };
    let before = list.len();
    list.retain(|f| f != finalizer);
    list.len() != before
}

/// Maps NotFound to `None`; a commit against a record that is already gone succeeds
pub(crate) fn tolerate_not_found<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
