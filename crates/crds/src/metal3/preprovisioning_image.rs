//! PreprovisioningImage (metal3.io/v1alpha1)
//!
//! Created by the Bare Metal Operator with the same name/namespace as its
//! BareMetalHost. The plugin only touches its labels.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
#[kube(
    group = "metal3.io",
    version = "v1alpha1",
    kind = "PreprovisioningImage",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct PreprovisioningImageSpec {
    /// CPU architecture of the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,

    /// Secret holding network data baked into the image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_data_name: Option<String>,

    /// Accepted image formats
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept_formats: Vec<String>,
}
