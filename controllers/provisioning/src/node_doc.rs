//! Typed access to ClusterInstance node documents
//!
//! Node slots are installer-owned JSON objects. [`NodeDocument`] reads and
//! writes them by field path and reports a missing path or an unexpected
//! type as an error instead of panicking on dynamic indexing.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeDocumentError {
    #[error("{0} not found")]
    PathNotFound(String),

    #[error("{path} is not a valid {expected}")]
    WrongType { path: String, expected: &'static str },
}

fn wrong_type(path: &str, expected: &'static str) -> NodeDocumentError {
    NodeDocumentError::WrongType {
        path: path.to_string(),
        expected,
    }
}

/// One node slot of a ClusterInstance
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDocument {
    fields: Map<String, Value>,
}

impl NodeDocument {
    /// Wrap the slot at `index`, which must be an object
    pub fn from_value(index: usize, value: &Value) -> Result<Self, NodeDocumentError> {
        match value {
            Value::Object(fields) => Ok(Self { fields: fields.clone() }),
            _ => Err(wrong_type(&format!("node at index {}", index), "map")),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn get(&self, path: &[&str]) -> Result<&Value, NodeDocumentError> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| NodeDocumentError::PathNotFound(String::new()))?;
        let mut map = &self.fields;
        for (depth, key) in parents.iter().enumerate() {
            map = map
                .get(*key)
                .ok_or_else(|| NodeDocumentError::PathNotFound(path[..=depth].join(".")))?
                .as_object()
                .ok_or_else(|| wrong_type(&path[..=depth].join("."), "map"))?;
        }
        map.get(*last)
            .ok_or_else(|| NodeDocumentError::PathNotFound(path.join(".")))
    }

    pub fn get_str(&self, path: &[&str]) -> Result<&str, NodeDocumentError> {
        self.get(path)?
            .as_str()
            .ok_or_else(|| wrong_type(&path.join("."), "string"))
    }

    /// String field, empty when absent or not a string
    pub fn str_or_default(&self, key: &str) -> &str {
        self.get_str(&[key]).unwrap_or_default()
    }

    /// Set `path`, creating intermediate objects as needed
    pub fn set(&mut self, path: &[&str], value: Value) -> Result<(), NodeDocumentError> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| NodeDocumentError::PathNotFound(String::new()))?;
        let mut map = &mut self.fields;
        for (depth, key) in parents.iter().enumerate() {
            map = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| wrong_type(&path[..=depth].join("."), "map"))?;
        }
        map.insert(last.to_string(), value);
        Ok(())
    }

    /// Mutable access to a list field
    pub fn list_mut(&mut self, path: &[&str]) -> Result<&mut Vec<Value>, NodeDocumentError> {
        let (last, parents) = path
            .split_last()
            .ok_or_else(|| NodeDocumentError::PathNotFound(String::new()))?;
        let mut map = &mut self.fields;
        for (depth, key) in parents.iter().enumerate() {
            map = map
                .get_mut(*key)
                .ok_or_else(|| NodeDocumentError::PathNotFound(path[..=depth].join(".")))?
                .as_object_mut()
                .ok_or_else(|| wrong_type(&path[..=depth].join("."), "map"))?;
        }
        map.get_mut(*last)
            .ok_or_else(|| NodeDocumentError::PathNotFound(path.join(".")))?
            .as_array_mut()
            .ok_or_else(|| wrong_type(&path.join("."), "list"))
    }
}
