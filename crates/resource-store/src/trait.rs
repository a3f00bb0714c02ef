//! ResourceStore trait for mocking
//!
//! Abstracts the Kubernetes API behind a generic versioned object store so
//! reconcilers and plugins can be unit tested against an in-memory store.
//! `KubeStore` implements it against a live cluster; `MockStore` (feature
//! `test-util`) keeps objects in memory.

use crate::error::StoreError;
use crate::selector::LabelSelector;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Bounds shared by every object kept in a store
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
}

impl<T> StoreObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Serialize
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static
{
}

/// Versioned get/list/write access to namespaced objects of one kind
///
/// `replace` and `replace_status` are conditional on
/// `metadata.resourceVersion` and fail with [`StoreError::Conflict`] when the
/// stored object moved on. All async methods must be `Send` to work with
/// Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ResourceStore<K: StoreObject>: Send + Sync {
    /// Fetch the latest revision of an object
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// Fetch an object, mapping not-found to `None`
    async fn get_opt(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        match self.get(namespace, name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// List objects matching a label selector, ordered by name
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<K>, StoreError>;

    /// Create a new object
    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Replace spec and metadata, conditional on resourceVersion
    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Replace the status subresource, conditional on resourceVersion
    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError>;

    /// Delete an object; deleting an absent object succeeds
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
