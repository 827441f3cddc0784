//! Metal provider CRD Definitions
//!
//! Kubernetes Custom Resource Definitions owned by the metal infrastructure
//! provider, plus the external kinds it reads (Cluster API core and the
//! server-claim subsystem).

pub mod capi;
pub mod conditions;
pub mod metal_cluster;
pub mod metal_machine;
pub mod references;
pub mod server_claim;
pub mod well_known;

pub use capi::*;
pub use conditions::*;
pub use metal_cluster::*;
pub use metal_machine::*;
pub use references::*;
pub use server_claim::*;
pub use well_known::*;
