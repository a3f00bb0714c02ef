//! Schema helpers for fields that carry free-form documents

use schemars::{json_schema, Schema, SchemaGenerator};

/// Object schema that keeps unknown fields (`x-kubernetes-preserve-unknown-fields`)
pub fn preserve_unknown_fields(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}

/// Array of free-form objects
pub fn array_of_unknown_objects(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "array",
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}
