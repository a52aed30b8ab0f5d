//! Entity projection: turning a flat stream entry into the typed view the
//! index managers consume.

mod registry;

pub use registry::{EntityRegistry, EntityType, FieldKind, FieldSpec, LabelRule};

use crate::cdc::{before_field, FIELD_SOURCE_OPERATION};
use crate::error::{Result, StreamdexError};
use crate::log::StreamEntry;
use crate::types::Operation;
use indexmap::IndexMap;

/// One change, projected onto an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub entity: String,
    pub operation: Operation,
    /// Primary key value.
    pub key: String,
    /// `{key_prefix}:{key}`.
    pub doc_id: String,
    /// Declared fields present on the entry. The pre-image for DELETE.
    pub fields: IndexMap<String, String>,
    /// Declared fields of the pre-image, UPDATE only.
    pub before: Option<IndexMap<String, String>>,
    pub label: Option<String>,
    pub before_label: Option<String>,
    label_target: Option<String>,
}

impl Projection {
    /// Fields to index: the current values plus the computed label field.
    pub fn document_fields(&self) -> IndexMap<String, String> {
        let mut doc = self.fields.clone();
        if let (Some(target), Some(label)) = (&self.label_target, &self.label) {
            doc.insert(target.clone(), label.clone());
        }
        doc
    }
}

/// Project `entry` onto `entity`.
///
/// Required fields must be present for CREATE and UPDATE. A DELETE only
/// needs the primary key, since its body is whatever pre-image the source
/// captured.
pub fn project(entity: &EntityType, entry: &StreamEntry) -> Result<Projection> {
    let operation: Operation = entry
        .field(FIELD_SOURCE_OPERATION)
        .ok_or_else(|| {
            StreamdexError::MalformedEntry(format!(
                "entry {} has no {}",
                entry.id, FIELD_SOURCE_OPERATION
            ))
        })?
        .parse()?;

    let mut fields = IndexMap::new();
    for spec in entity.source_fields() {
        match entry.field(&spec.name) {
            Some(value) => {
                fields.insert(spec.name.clone(), value.to_string());
            }
            None if spec.required && operation != Operation::Delete => {
                return Err(missing(entity, &spec.name));
            }
            None => {}
        }
    }

    let key = fields
        .get(&entity.primary_key)
        .cloned()
        .ok_or_else(|| missing(entity, &entity.primary_key))?;

    let before = if operation == Operation::Update {
        let mut before = IndexMap::new();
        for spec in entity.source_fields() {
            if let Some(value) = entry.field(&before_field(&spec.name)) {
                before.insert(spec.name.clone(), value.to_string());
            }
        }
        Some(before)
    } else {
        None
    };

    let label = entity.label.compute(&fields);
    let before_label = before.as_ref().and_then(|b| entity.label.compute(b));

    Ok(Projection {
        entity: entity.name.clone(),
        operation,
        doc_id: entity.doc_id(&key),
        key,
        fields,
        before,
        label,
        before_label,
        label_target: entity.label.target().map(str::to_string),
    })
}

fn missing(entity: &EntityType, field: &str) -> StreamdexError {
    StreamdexError::MissingField {
        entity: entity.name.clone(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pairs: &[(&str, &str)]) -> StreamEntry {
        StreamEntry {
            id: 1,
            timestamp_ms: 0,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_project_movie_update() {
        let movies = EntityType::movies();
        let p = project(
            &movies,
            &entry(&[
                ("source.table", "movies"),
                ("source.operation", "UPDATE"),
                ("movie_id", "42"),
                ("title", "New"),
                ("genre", "Drama"),
                ("before:movie_id", "42"),
                ("before:title", "Old"),
                ("unrelated", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(p.operation, Operation::Update);
        assert_eq!(p.doc_id, "ms:docs:movies:42");
        assert_eq!(p.label.as_deref(), Some("New"));
        assert_eq!(p.before_label.as_deref(), Some("Old"));
        assert!(!p.fields.contains_key("unrelated"));

        let doc = p.document_fields();
        assert!(doc.keys().all(|k| !k.starts_with("before:")));
        assert_eq!(doc["title"], "New");
    }

    #[test]
    fn test_missing_required_field() {
        let err = project(
            &EntityType::movies(),
            &entry(&[
                ("source.operation", "CREATE"),
                ("movie_id", "1"),
                ("title", "No genre"),
            ]),
        )
        .unwrap_err();

        match err {
            StreamdexError::MissingField { entity, field } => {
                assert_eq!(entity, "movies");
                assert_eq!(field, "genre");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_delete_needs_only_primary_key() {
        let p = project(
            &EntityType::movies(),
            &entry(&[
                ("source.operation", "DELETE"),
                ("movie_id", "3"),
                ("title", "Gone"),
            ]),
        )
        .unwrap();

        assert_eq!(p.operation, Operation::Delete);
        assert_eq!(p.label.as_deref(), Some("Gone"));
        assert!(p.before.is_none());

        let err = project(
            &EntityType::movies(),
            &entry(&[("source.operation", "DELETE"), ("title", "Gone")]),
        )
        .unwrap_err();
        assert!(matches!(err, StreamdexError::MissingField { .. }));
    }

    #[test]
    fn test_actor_full_name_is_indexed() {
        let p = project(
            &EntityType::actors(),
            &entry(&[
                ("source.operation", "CREATE"),
                ("actor_id", "5"),
                ("first_name", "Greta"),
            ]),
        )
        .unwrap();

        assert_eq!(p.label.as_deref(), Some("Greta -"));
        assert_eq!(p.document_fields()["full_name"], "Greta -");
    }

    #[test]
    fn test_entry_without_operation_is_malformed() {
        let err = project(&EntityType::movies(), &entry(&[("movie_id", "1")])).unwrap_err();
        assert!(matches!(err, StreamdexError::MalformedEntry(_)));
    }
}
