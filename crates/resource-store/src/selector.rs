//! Equality-based label selectors
//!
//! Renders to the Kubernetes `labelSelector` query syntax for `KubeStore`
//! and evaluates locally for `MockStore` and in-process filtering.

use std::collections::BTreeMap;

/// A single selector requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// `key=value`
    Equals(String, String),
    /// `key!=value`; also matches objects without the key
    NotEquals(String, String),
    /// `key`
    Exists(String),
    /// `!key`
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let get = |k: &str| labels.and_then(|l| l.get(k));
        match self {
            Requirement::Equals(k, v) => get(k) == Some(v),
            Requirement::NotEquals(k, v) => get(k) != Some(v),
            Requirement::Exists(k) => get(k).is_some(),
            Requirement::DoesNotExist(k) => get(k).is_none(),
        }
    }

    fn render(&self) -> String {
        match self {
            Requirement::Equals(k, v) => format!("{}={}", k, v),
            Requirement::NotEquals(k, v) => format!("{}!={}", k, v),
            Requirement::Exists(k) => k.clone(),
            Requirement::DoesNotExist(k) => format!("!{}", k),
        }
    }
}

/// Conjunction of label requirements; the empty selector matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Empty selector
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `key=value`
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Equals(key.into(), value.into()));
        self
    }

    /// Add `key!=value`
    #[must_use]
    pub fn not_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(Requirement::NotEquals(key.into(), value.into()));
        self
    }

    /// Add `key`
    #[must_use]
    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Exists(key.into()));
        self
    }

    /// Add `!key`
    #[must_use]
    pub fn does_not_exist(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement::DoesNotExist(key.into()));
        self
    }

    /// Add `key=value` for every entry of a map
    #[must_use]
    pub fn match_labels<'a>(mut self, labels: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (k, v) in labels {
            self.requirements.push(Requirement::Equals(k.clone(), v.clone()));
        }
        self
    }

    /// Whether no requirement was added
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Render as a `labelSelector` query value
    pub fn to_query_string(&self) -> String {
        self.requirements
            .iter()
            .map(Requirement::render)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Evaluate against a label map
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}
