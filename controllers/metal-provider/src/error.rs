//! Controller-specific error types.
//!
//! Store errors raised inside a reconcile pass are wrapped with the name of the
//! step that failed, so the dispatcher log says what was being attempted.

use crate::scope::ScopeError;
use record_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the metal provider controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Record store error outside of a named step
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// Record store error raised by a pipeline step
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    /// A scope could not be built from the fetched records
    #[error("Scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Bootstrap data secret is unusable
    #[error("Bootstrap data error: {0}")]
    BootstrapData(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry or server error
    #[error("Metrics error: {0}")]
    Metrics(String),
}

impl From<prometheus::Error> for ControllerError {
    fn from(err: prometheus::Error) -> Self {
        ControllerError::Metrics(err.to_string())
    }
}

/// Attaches the failing step name to store errors
pub trait StepContext<T> {
    fn step(self, step: &'static str) -> Result<T, ControllerError>;
}

impl<T> StepContext<T> for Result<T, StoreError> {
    fn step(self, step: &'static str) -> Result<T, ControllerError> {
        self.map_err(|source| ControllerError::Step { step, source })
    }
}
