//! Provisioning-side CRDs: the request a user submits and the rendered
//! cluster definition it produces.

pub mod cluster_instance;
pub mod provisioning_request;

pub use cluster_instance::*;
pub use provisioning_request::*;
