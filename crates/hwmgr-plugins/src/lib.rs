//! Hardware manager plugins
//!
//! A plugin turns a `NodeAllocationRequest` into claimed hosts, one
//! `AllocatedNode` per host, and `Provisioned`/`Configured` conditions.
//!
//! - [`metal3`]: BareMetalHosts managed by the Bare Metal Operator
//! - [`loopback`]: a static YAML inventory, no hardware involved
//!
//! The plugin controller picks one through [`PluginRegistry`].

pub mod error;
pub mod loopback;
pub mod metal3;
pub mod nodes;
pub mod plugin;
pub mod registry;

pub use error::PluginError;
pub use loopback::{Inventory, LoopbackPlugin, LOOPBACK_PLUGIN_ID};
pub use metal3::{HostManager, Metal3Plugin, DEFAULT_HOST_NAMESPACE, METAL3_PLUGIN_ID};
pub use plugin::{AllocationScope, HardwarePlugin, Host, HostPool, RequestStatus};
pub use registry::PluginRegistry;
