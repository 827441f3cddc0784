//! Prints the CRD manifests owned by the metal provider as a multi-document YAML stream
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/bases/crds.yaml`

use crds::{MetalCluster, MetalMachine, MetalMachineTemplate};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        MetalCluster::crd(),
        MetalMachine::crd(),
        MetalMachineTemplate::crd(),
    ];

    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
