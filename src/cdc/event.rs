use super::{
    before_field, FIELD_SOURCE_DB, FIELD_SOURCE_KEY_FIELDS, FIELD_SOURCE_OPERATION,
    FIELD_SOURCE_TABLE,
};
use crate::types::Operation;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeHeader {
    pub source_database: String,
    pub source_table: String,
    pub operation: Operation,
    pub key_fields: Vec<String>,
}

/// Canonical change event.
///
/// `body` is the post-image for CREATE and UPDATE and the pre-image for
/// DELETE. `before` is set only for UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub header: ChangeHeader,
    pub body: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<IndexMap<String, Value>>,
}

impl ChangeEvent {
    pub fn operation(&self) -> Operation {
        self.header.operation
    }

    pub fn table(&self) -> &str {
        &self.header.source_table
    }

    /// Flatten into the string map appended to the change log.
    ///
    /// Header fields use the `source.` namespace and pre-image fields the
    /// `before:` namespace, so body columns never collide with either. Null
    /// values are left out.
    pub fn to_stream_fields(&self) -> IndexMap<String, String> {
        let mut fields = IndexMap::new();
        fields.insert(
            FIELD_SOURCE_DB.to_string(),
            self.header.source_database.clone(),
        );
        fields.insert(
            FIELD_SOURCE_TABLE.to_string(),
            self.header.source_table.clone(),
        );
        fields.insert(
            FIELD_SOURCE_OPERATION.to_string(),
            self.header.operation.as_str().to_string(),
        );
        fields.insert(
            FIELD_SOURCE_KEY_FIELDS.to_string(),
            self.header.key_fields.join(","),
        );

        for (name, value) in &self.body {
            if let Some(text) = value_to_field(value) {
                fields.insert(name.clone(), text);
            }
        }

        if let Some(before) = &self.before {
            for (name, value) in before {
                if let Some(text) = value_to_field(value) {
                    fields.insert(before_field(name), text);
                }
            }
        }

        fields
    }
}

/// Render a captured column value as a stream field value.
pub fn value_to_field(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
