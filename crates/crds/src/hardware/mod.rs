//! Hardware manager CRDs
//!
//! The contract between the provisioning controller and a hardware plugin:
//! the provisioning side writes a `NodeAllocationRequest`, the plugin answers
//! with one `AllocatedNode` per claimed host and reports `Provisioned` /
//! `Configured` conditions on the request.

pub mod allocated_node;
pub mod hardware_template;
pub mod node_allocation_request;

pub use allocated_node::*;
pub use hardware_template::*;
pub use node_allocation_request::*;

/// Label on AllocatedNodes naming the NodeAllocationRequest they belong to
pub const NODE_ALLOCATION_REQUEST_LABEL: &str = "plugins.clcm.openshift.io/node-allocation-request";

/// Annotation on a NodeAllocationRequest carrying the boot interface label
pub const BOOT_INTERFACE_LABEL_ANNOTATION: &str = "clcm.openshift.io/boot-interface-label";

/// Finalizer held by the hardware plugin until a request's hosts are released
pub const NODE_ALLOCATION_REQUEST_FINALIZER: &str = "plugins.clcm.openshift.io/node-allocation-request-finalizer";
