//! Namespaced object references
//!
//! Used wherever one object points at another across the CRDs (an
//! AllocatedNode pointing at its host, a ClusterInstance node slot's
//! `hostRef`) and as the `namespace/name` key in logs and backoff tracking.

use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kubernetes-style `{name, namespace}` reference
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedName {
    /// Namespace of the referenced object
    pub namespace: String,

    /// Name of the referenced object
    pub name: String,
}

impl NamespacedName {
    /// Create a reference from namespace and name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference to a namespaced resource; an unset namespace becomes ""
    pub fn of<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_default(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BareMetalHost;

    #[test]
    fn test_display_and_of() {
        let mut host = BareMetalHost::new("bmh-1", Default::default());
        host.metadata.namespace = Some("hosts".to_string());
        let r = NamespacedName::of(&host);
        assert_eq!(r, NamespacedName::new("hosts", "bmh-1"));
        assert_eq!(r.to_string(), "hosts/bmh-1");
    }
}
