//! Reconcilers for the metal provider records.
//!
//! - `cluster`: MetalCluster gate (finalizer, `ClusterReady`, deletion ordering)
//! - `machine`: MetalMachine provisioning pipeline
//!
//! A reconciler is handed only the key of the record to converge. Every pass
//! re-reads what it needs from the record store and derives the full desired
//! state again, so a pass interrupted between any two steps resumes correctly
//! on the next delivery.

pub mod cluster;
pub mod machine;

pub use cluster::ClusterReconciler;
pub use machine::MachineReconciler;

use crate::error::ControllerError;
use crds::{CLUSTER_API_GROUP, group_of};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube_runtime::controller::Action;
use record_store::StoreError;
use std::any::Any;
use std::time::Duration;
use tracing::error;

/// What the dispatcher should do with a key after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Converged or waiting on an external event; nothing is scheduled
    Done,
    /// Expected-pending state; re-check after a fixed delay
    RequeueAfter(Duration),
}

impl NextAction {
    /// Metrics label for the outcome
    pub fn outcome(&self) -> &'static str {
        match self {
            NextAction::Done => "done",
            NextAction::RequeueAfter(_) => "requeue",
        }
    }
}

impl From<NextAction> for Action {
    fn from(next: NextAction) -> Self {
        match next {
            NextAction::Done => Action::await_change(),
            NextAction::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// A reconciler driven by record keys
#[async_trait::async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Controller name used in logs and metrics
    const NAME: &'static str;

    async fn reconcile(&self, namespace: &str, name: &str) -> Result<NextAction, ControllerError>;
}

/// Name of the Cluster API owner of `kind` in the owner references, if set
pub(crate) fn owner_name<'a>(meta: &'a ObjectMeta, kind: &str) -> Option<&'a str> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| owner.kind == kind && group_of(&owner.api_version) == CLUSTER_API_GROUP)
        .map(|owner| owner.name.as_str())
}

/// Combines the outcome of a scoped pass with the outcome of closing the scope
///
/// The body's own error wins over a failed commit; the commit error is still
/// logged. A panic in the body is re-raised after the scope has been closed.
pub(crate) fn finish(
    body: Result<Result<NextAction, ControllerError>, Box<dyn Any + Send>>,
    closed: Result<(), StoreError>,
    commit_step: &'static str,
) -> Result<NextAction, ControllerError> {
    match (body, closed) {
        (Err(panic), closed) => {
            if let Err(e) = closed {
                error!("{} failed while unwinding: {}", commit_step, e);
            }
            std::panic::resume_unwind(panic)
        }
        (Ok(Err(e)), Err(close_err)) => {
            error!("{} failed: {}", commit_step, close_err);
            Err(e)
        }
        (Ok(Err(e)), Ok(())) => Err(e),
        (Ok(Ok(_)), Err(source)) => Err(ControllerError::Step { step: commit_step, source }),
        (Ok(Ok(next)), Ok(())) => Ok(next),
    }
}
