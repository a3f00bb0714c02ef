//! ResourceStore backed by the Kubernetes API

use crate::error::StoreError;
use crate::selector::LabelSelector;
use crate::store_trait::{ResourceStore, StoreObject};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use std::marker::PhantomData;

/// Typed store over `Api<K>`; one instance serves every namespace
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> std::fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K: StoreObject> KubeStore<K> {
    /// Creates a new store sharing the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map API status codes onto store errors: 404 not found, 409 conflict or
/// already-exists depending on the verb
fn map_kube_error<K: StoreObject>(err: kube::Error, namespace: &str, name: &str, creating: bool) -> StoreError {
    let kind = K::kind(&());
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::not_found(&kind, namespace, name),
        kube::Error::Api(ae) if ae.code == 409 && creating => StoreError::already_exists(&kind, namespace, name),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::conflict(&kind, namespace, name, ae.message),
        other => StoreError::Kube(other),
    }
}

fn object_name<K: StoreObject>(obj: &K) -> Result<String, StoreError> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::Invalid(format!("{} without metadata.name", K::kind(&()))))
}

#[async_trait::async_trait]
impl<K: StoreObject> ResourceStore<K> for KubeStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, name, false))
    }

    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_query_string());
        }
        let mut items = self.api(namespace).list(&params).await?.items;
        items.sort_by_key(|obj| obj.name_any());
        Ok(items)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = object_name(obj)?;
        self.api(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, &name, true))
    }

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = object_name(obj)?;
        self.api(namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, &name, false))
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = object_name(obj)?;
        let body = serde_json::to_vec(obj)?;
        self.api(namespace)
            .replace_subresource("status", &name, &PostParams::default(), body)
            .await
            .map_err(|e| map_kube_error::<K>(e, namespace, &name, false))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(map_kube_error::<K>(e, namespace, name, false)),
        }
    }
}
