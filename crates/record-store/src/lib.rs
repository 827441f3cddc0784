//! Record Store Client
//!
//! Typed access to the records the metal provider reads and writes: Cluster
//! API `Cluster`/`Machine`, the provider's own `MetalCluster`/`MetalMachine`,
//! bootstrap and ignition `Secret`s, and `ServerClaim`s.
//!
//! # Features
//!
//! - **Optimistic concurrency**: merge patches may carry `metadata.resourceVersion`
//! - **Error classification**: NotFound and Conflict are distinguishable from transport errors
//! - **Mocking**: `test-util` enables an in-memory [`MockRecordStore`]

pub mod client;
pub mod error;
pub mod merge;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeRecordStore;
pub use error::StoreError;
pub use merge::{apply_merge_patch, merge_diff};
pub use store_trait::RecordStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockRecordStore, WriteRecord, WriteVerb};
