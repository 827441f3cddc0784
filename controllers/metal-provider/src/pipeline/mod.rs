//! Pure derivation steps of the MetalMachine pipeline
//!
//! Each function computes a desired record or value from the records read in
//! the current pass. Nothing here talks to the store.

pub mod ignition;
pub mod provider_id;
pub mod server_claim;

pub use ignition::{IGNITION_DATA_KEY, desired_ignition_secret, ignition_secret_name};
pub use provider_id::provider_id;
pub use server_claim::desired_server_claim;
