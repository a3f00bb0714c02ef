//! Prints the CRDs owned by this project as a multi-document YAML stream.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > config/crd/bases/crds.yaml
//! ```

use crds::{AllocatedNode, HardwareTemplate, NodeAllocationRequest, ProvisioningRequest};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        NodeAllocationRequest::crd(),
        AllocatedNode::crd(),
        HardwareTemplate::crd(),
        ProvisioningRequest::crd(),
    ];
    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
