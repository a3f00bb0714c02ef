//! Mock ResourceStore for unit testing
//!
//! Keeps objects in memory with real resourceVersion semantics: writes are
//! conditional, status and spec are written through separate paths, and
//! deleting an object that still carries finalizers only marks it for
//! deletion. Conflicts and not-found responses can be injected to exercise
//! the retry paths.

use crate::error::StoreError;
use crate::selector::LabelSelector;
use crate::store_trait::{ResourceStore, StoreObject};
use chrono::SecondsFormat;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::Resource;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const DEFAULT_NAMESPACE: &str = "default";

struct State<K> {
    objects: BTreeMap<(String, String), K>,
    next_version: u64,
    pending_conflicts: usize,
    pending_not_found: usize,
}

/// In-memory store for one kind
pub struct MockStore<K> {
    state: Arc<Mutex<State<K>>>,
    writes: Arc<AtomicUsize>,
}

impl<K> Clone for MockStore<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<K: StoreObject> Default for MockStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StoreObject> MockStore<K> {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                next_version: 1,
                pending_conflicts: 0,
                pending_not_found: 0,
            })),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a store seeded with objects (for test setup)
    pub fn with_objects(objects: impl IntoIterator<Item = K>) -> Self {
        let store = Self::new();
        for obj in objects {
            store.insert(obj);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite an object without counting a write (for test setup).
    ///
    /// Missing namespace defaults to `default`; a fresh resourceVersion is
    /// always assigned.
    pub fn insert(&self, mut obj: K) {
        let mut state = self.lock();
        let version = state.bump();
        let meta = obj.meta_mut();
        let namespace = meta.namespace.get_or_insert_with(|| DEFAULT_NAMESPACE.to_string()).clone();
        let name = meta.name.clone().unwrap_or_default();
        meta.resource_version = Some(version);
        meta.generation.get_or_insert(1);
        state.objects.insert((namespace, name), obj);
    }

    /// Current stored revision, if any
    pub fn get_object(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored objects ordered by namespace then name
    pub fn objects(&self) -> Vec<K> {
        self.lock().objects.values().cloned().collect()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful create/replace/replace_status/delete calls since the last reset
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    /// Fail the next `n` replace/replace_status calls with a conflict
    pub fn inject_conflicts(&self, n: usize) {
        self.lock().pending_conflicts = n;
    }

    /// Fail the next `n` get calls with not-found
    pub fn inject_not_found(&self, n: usize) {
        self.lock().pending_not_found = n;
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl<K: StoreObject> State<K> {
    fn bump(&mut self) -> String {
        let version = self.next_version;
        self.next_version += 1;
        version.to_string()
    }

    fn take_injected_conflict(&mut self, kind: &str, namespace: &str, name: &str) -> Result<(), StoreError> {
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(StoreError::conflict(kind, namespace, name, "injected conflict"));
        }
        Ok(())
    }

    /// Stored object for a conditional write, checking resourceVersion
    fn current_for_write(&self, kind: &str, namespace: &str, obj: &K) -> Result<(String, K), StoreError> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid(format!("{} without metadata.name", kind)))?;
        let current = self
            .objects
            .get(&(namespace.to_string(), name.clone()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(kind, namespace, &name))?;
        let wanted = obj
            .meta()
            .resource_version
            .as_deref()
            .ok_or_else(|| StoreError::Invalid(format!("{} {}/{} without resourceVersion", kind, namespace, name)))?;
        if current.meta().resource_version.as_deref() != Some(wanted) {
            return Err(StoreError::conflict(
                kind,
                namespace,
                &name,
                "the object has been modified; please apply your changes to the latest version",
            ));
        }
        Ok((name, current))
    }
}

fn to_value<K: StoreObject>(obj: &K) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(obj)?)
}

fn from_value<K: StoreObject>(value: Value) -> Result<K, StoreError> {
    Ok(serde_json::from_value(value)?)
}

/// `field` of `target` replaced by the same field of `source` (removed when absent)
fn with_field_from(mut target: Value, source: &Value, field: &str) -> Value {
    if let Some(map) = target.as_object_mut() {
        match source.get(field) {
            Some(v) => {
                map.insert(field.to_string(), v.clone());
            }
            None => {
                map.remove(field);
            }
        }
    }
    target
}

fn deletion_timestamp_now() -> Result<Time, StoreError> {
    let now = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    Ok(serde_json::from_value(Value::String(now))?)
}

#[async_trait::async_trait]
impl<K: StoreObject> ResourceStore<K> for MockStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let kind = K::kind(&());
        let mut state = self.lock();
        if state.pending_not_found > 0 {
            state.pending_not_found -= 1;
            return Err(StoreError::not_found(&kind, namespace, name));
        }
        state
            .objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(&kind, namespace, name))
    }

    async fn list(&self, namespace: &str, selector: &LabelSelector) -> Result<Vec<K>, StoreError> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((ns, _), obj)| ns == namespace && selector.matches(obj.meta().labels.as_ref()))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let kind = K::kind(&());
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid(format!("{} without metadata.name", kind)))?;
        if obj.meta().resource_version.is_some() {
            return Err(StoreError::Invalid(format!(
                "resourceVersion should not be set on objects to be created: {} {}/{}",
                kind, namespace, name
            )));
        }

        let mut state = self.lock();
        let key = (namespace.to_string(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::already_exists(&kind, namespace, &name));
        }

        let mut created = obj.clone();
        let version = state.bump();
        let meta = created.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.resource_version = Some(version);
        meta.generation = Some(1);
        meta.deletion_timestamp = None;
        state.objects.insert(key, created.clone());
        drop(state);

        self.record_write();
        Ok(created)
    }

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let kind = K::kind(&());
        let mut state = self.lock();
        let name = obj.meta().name.clone().unwrap_or_default();
        state.take_injected_conflict(&kind, namespace, &name)?;
        let (name, current) = state.current_for_write(&kind, namespace, obj)?;

        // Status is owned by the subresource; deletionTimestamp by the server
        let current_value = to_value(&current)?;
        let incoming = to_value(obj)?;
        let spec_changed = incoming.get("spec") != current_value.get("spec");
        let mut updated: K = from_value(with_field_from(incoming, &current_value, "status"))?;

        let version = state.bump();
        let meta = updated.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.resource_version = Some(version);
        meta.deletion_timestamp = current.meta().deletion_timestamp.clone();
        let generation = current.meta().generation.unwrap_or(1);
        meta.generation = Some(if spec_changed { generation + 1 } else { generation });

        let key = (namespace.to_string(), name);
        let finalized = updated.meta().deletion_timestamp.is_some()
            && updated.meta().finalizers.as_ref().is_none_or(|f| f.is_empty());
        if finalized {
            state.objects.remove(&key);
        } else {
            state.objects.insert(key, updated.clone());
        }
        drop(state);

        self.record_write();
        Ok(updated)
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let kind = K::kind(&());
        let mut state = self.lock();
        let name = obj.meta().name.clone().unwrap_or_default();
        state.take_injected_conflict(&kind, namespace, &name)?;
        let (name, current) = state.current_for_write(&kind, namespace, obj)?;

        let incoming = to_value(obj)?;
        let mut updated: K = from_value(with_field_from(to_value(&current)?, &incoming, "status"))?;
        updated.meta_mut().resource_version = Some(state.bump());
        state.objects.insert((namespace.to_string(), name), updated.clone());
        drop(state);

        self.record_write();
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        let Some(current) = state.objects.get(&key).cloned() else {
            return Ok(());
        };

        let has_finalizers = current.meta().finalizers.as_ref().is_some_and(|f| !f.is_empty());
        if has_finalizers {
            if current.meta().deletion_timestamp.is_some() {
                return Ok(());
            }
            let mut marked = current;
            let version = state.bump();
            let meta = marked.meta_mut();
            meta.deletion_timestamp = Some(deletion_timestamp_now()?);
            meta.resource_version = Some(version);
            state.objects.insert(key, marked);
        } else {
            state.objects.remove(&key);
        }
        drop(state);

        self.record_write();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str, labels: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                labels: Some(labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("key".to_string(), "v1".to_string())])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_replace_conflicts() {
        let store = MockStore::with_objects([config_map("cm", &[])]);
        let first = store.get("ns", "cm").await.unwrap();
        let stale = first.clone();

        let mut updated = first;
        updated.data = Some(BTreeMap::from([("key".to_string(), "v2".to_string())]));
        store.replace("ns", &updated).await.unwrap();

        let err = store.replace("ns", &stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_versions() {
        let store: MockStore<ConfigMap> = MockStore::new();
        let mut cm = config_map("cm", &[]);
        cm.metadata.resource_version = None;
        let created = store.create("ns", &cm).await.unwrap();
        assert!(created.metadata.resource_version.is_some());

        assert!(matches!(store.create("ns", &cm).await, Err(StoreError::AlreadyExists { .. })));
        assert!(matches!(store.create("ns", &created).await, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_list_filters_by_namespace_and_selector() {
        let store = MockStore::with_objects([
            config_map("b", &[("site", "s1")]),
            config_map("a", &[("site", "s1")]),
            config_map("c", &[("site", "s2")]),
        ]);
        let listed = store.list("ns", &LabelSelector::new().eq("site", "s1")).await.unwrap();
        let names: Vec<_> = listed.iter().map(|cm| cm.metadata.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(store.list("other", &LabelSelector::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_marks_then_removes() {
        let mut cm = config_map("cm", &[]);
        cm.metadata.finalizers = Some(vec!["example.com/cleanup".to_string()]);
        let store = MockStore::with_objects([cm]);

        store.delete("ns", "cm").await.unwrap();
        let mut marked = store.get("ns", "cm").await.unwrap();
        assert!(marked.metadata.deletion_timestamp.is_some());

        marked.metadata.finalizers = Some(vec![]);
        store.replace("ns", &marked).await.unwrap();
        assert!(store.get_object("ns", "cm").is_none());

        // Absent objects delete cleanly
        store.delete("ns", "cm").await.unwrap();
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MockStore::with_objects([config_map("cm", &[])]);
        store.inject_not_found(1);
        assert!(store.get("ns", "cm").await.unwrap_err().is_not_found());
        let cm = store.get("ns", "cm").await.unwrap();

        store.inject_conflicts(1);
        assert!(store.replace("ns", &cm).await.unwrap_err().is_conflict());
        store.replace("ns", &cm).await.unwrap();
    }
}
