//! Hardware lifecycle CRD Definitions
//!
//! Kubernetes Custom Resource Definitions shared by the provisioning
//! controller and the hardware plugins.

pub mod condition;
pub mod hardware;
pub mod metal3;
pub mod provisioning;
pub mod references;
pub mod schema;

pub use condition::*;
pub use hardware::*;
pub use metal3::*;
pub use provisioning::*;
pub use references::*;
