//! metal3.io types consumed by the metal3 hardware plugin
//!
//! These CRDs are owned by the Bare Metal Operator; only the fields the
//! plugin reads or writes are modelled. `crdgen` does not emit them.

pub mod bare_metal_host;
pub mod preprovisioning_image;

pub use bare_metal_host::*;
pub use preprovisioning_image::*;
