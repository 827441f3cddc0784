//! Record store errors

use thiserror::Error;

/// Errors that can occur when talking to the record store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed, or the record already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record is missing data the store needs (name, namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Store rejected the request for any other reason
    #[error("Store API error: {0}")]
    Api(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(resp.message.clone()),
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(resp.message.clone()),
            _ => StoreError::Kube(err),
        }
    }
}
