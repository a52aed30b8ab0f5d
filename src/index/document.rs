use super::schema::EntitySchema;
use crate::error::{Result, StreamdexError};
use crate::projector::FieldKind;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tantivy::schema::OwnedValue;
use tantivy::TantivyDocument;

/// A document as stored in an entity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub fields: IndexMap<String, String>,
}

/// Build the tantivy document for `doc_id` from projected field values.
///
/// Values of fields the schema does not declare are kept in `_source` only.
/// Numeric fields must parse as numbers.
pub fn to_tantivy(
    schema: &EntitySchema,
    doc_id: &str,
    fields: &IndexMap<String, String>,
) -> Result<TantivyDocument> {
    let mut doc = TantivyDocument::default();
    doc.add_text(schema.id, doc_id);
    doc.add_text(schema.source, serde_json::to_string(fields)?);

    for (spec, field) in &schema.fields {
        let Some(value) = fields.get(&spec.name) else {
            continue;
        };
        match spec.kind {
            FieldKind::Numeric => {
                let number: f64 = value.trim().parse().map_err(|_| {
                    StreamdexError::InvalidDocument(format!(
                        "{}: field '{}' is not numeric: {:?}",
                        doc_id, spec.name, value
                    ))
                })?;
                doc.add_f64(*field, number);
            }
            FieldKind::Text { .. } | FieldKind::Tag | FieldKind::Stored => {
                doc.add_text(*field, value);
            }
        }
    }

    Ok(doc)
}

pub fn from_tantivy(schema: &EntitySchema, doc: &TantivyDocument) -> Result<IndexedDocument> {
    let id = stored_text(doc, schema.id)
        .ok_or_else(|| StreamdexError::InvalidDocument("stored document has no _id".to_string()))?;
    let fields = match stored_text(doc, schema.source) {
        Some(source) => serde_json::from_str(&source)?,
        None => IndexMap::new(),
    };
    Ok(IndexedDocument { id, fields })
}

fn stored_text(doc: &TantivyDocument, field: tantivy::schema::Field) -> Option<String> {
    doc.get_first(field).and_then(|v| {
        let owned: OwnedValue = v.into();
        match owned {
            OwnedValue::Str(s) => Some(s),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::EntityType;

    fn movie_schema() -> EntitySchema {
        let movies = EntityType::movies();
        EntitySchema::resolve(&movies, &EntitySchema::build(&movies)).unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_stored_source_keeps_original_text() {
        let schema = movie_schema();
        let input = fields(&[("movie_id", "7"), ("title", "Alien"), ("rating", "8.50")]);

        let doc = to_tantivy(&schema, "ms:docs:movies:7", &input).unwrap();
        let back = from_tantivy(&schema, &doc).unwrap();

        assert_eq!(back.id, "ms:docs:movies:7");
        assert_eq!(back.fields, input);
    }

    #[test]
    fn test_non_numeric_value_is_rejected() {
        let schema = movie_schema();
        let err = to_tantivy(
            &schema,
            "ms:docs:movies:7",
            &fields(&[("movie_id", "7"), ("votes", "many")]),
        )
        .unwrap_err();

        assert!(matches!(err, StreamdexError::InvalidDocument(_)));
    }
}
