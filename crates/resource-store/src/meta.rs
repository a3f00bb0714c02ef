//! Label and annotation mutation with conflict retry
//!
//! Allocation labels and configuration annotations on hosts act as a
//! distributed lock between controllers, so every change goes through a
//! conditional write. No-op mutations (adding a key already at the requested
//! value, removing an absent key) skip the write entirely.

use crate::error::StoreError;
use crate::retry::RetryContext;
use crate::store_trait::{ResourceStore, StoreObject};
use crate::update::update_with_retry;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Metadata map targeted by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaType {
    Label,
    Annotation,
}

impl FromStr for MetaType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "label" => Ok(MetaType::Label),
            "annotation" => Ok(MetaType::Annotation),
            other => Err(StoreError::UnsupportedMetaType(other.to_string())),
        }
    }
}

impl fmt::Display for MetaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaType::Label => write!(f, "label"),
            MetaType::Annotation => write!(f, "annotation"),
        }
    }
}

/// Mutation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOp {
    Add,
    Remove,
}

impl FromStr for MetaOp {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(MetaOp::Add),
            "remove" => Ok(MetaOp::Remove),
            other => Err(StoreError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl fmt::Display for MetaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaOp::Add => write!(f, "add"),
            MetaOp::Remove => write!(f, "remove"),
        }
    }
}

/// One label/annotation change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMutation {
    pub meta_type: MetaType,
    pub key: String,
    pub value: String,
    pub op: MetaOp,
}

impl MetaMutation {
    pub fn add_label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MetaType::Label, key, value, MetaOp::Add)
    }

    pub fn remove_label(key: impl Into<String>) -> Self {
        Self::new(MetaType::Label, key, "", MetaOp::Remove)
    }

    pub fn add_annotation(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MetaType::Annotation, key, value, MetaOp::Add)
    }

    pub fn remove_annotation(key: impl Into<String>) -> Self {
        Self::new(MetaType::Annotation, key, "", MetaOp::Remove)
    }

    pub fn new(meta_type: MetaType, key: impl Into<String>, value: impl Into<String>, op: MetaOp) -> Self {
        Self {
            meta_type,
            key: key.into(),
            value: value.into(),
            op,
        }
    }

    /// Build a mutation from its string form ("label"/"annotation", "add"/"remove")
    pub fn parse(meta_type: &str, key: &str, value: &str, op: &str) -> Result<Self, StoreError> {
        Ok(Self::new(meta_type.parse()?, key, value, op.parse()?))
    }

    /// Apply to object metadata, returning true when the map changed
    pub fn apply(&self, meta: &mut ObjectMeta) -> bool {
        let map = match self.meta_type {
            MetaType::Label => &mut meta.labels,
            MetaType::Annotation => &mut meta.annotations,
        };
        match self.op {
            MetaOp::Add => {
                if map.as_ref().and_then(|m| m.get(&self.key)) == Some(&self.value) {
                    return false;
                }
                map.get_or_insert_with(BTreeMap::new)
                    .insert(self.key.clone(), self.value.clone());
                true
            }
            MetaOp::Remove => match map.as_mut() {
                Some(m) => m.remove(&self.key).is_some(),
                None => false,
            },
        }
    }
}

impl fmt::Display for MetaMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            MetaOp::Add => write!(f, "{} {} {}={}", self.op, self.meta_type, self.key, self.value),
            MetaOp::Remove => write!(f, "{} {} {}", self.op, self.meta_type, self.key),
        }
    }
}

/// Apply a label/annotation mutation to `namespace/name` with conflict retry.
///
/// Returns the latest object. Skipped mutations perform no write.
pub async fn update_meta_with_retry<K: StoreObject>(
    store: &dyn ResourceStore<K>,
    ctx: &RetryContext,
    namespace: &str,
    name: &str,
    mutation: &MetaMutation,
) -> Result<K, StoreError> {
    debug!("{} on {} {}/{}", mutation, K::kind(&()), namespace, name);
    update_with_retry(store, ctx, namespace, name, |obj: &mut K| {
        mutation.apply(obj.meta_mut())
    })
    .await
}
