use crate::error::{Result, StreamdexError};
use crate::projector::{EntityType, FieldKind, FieldSpec};
use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema as TantivySchema, TextFieldIndexing,
    TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RawTokenizer, RemoveLongFilter, SimpleTokenizer, TextAnalyzer,
};

pub const ID_FIELD: &str = "_id";
pub const SOURCE_FIELD: &str = "_source";

/// Tokenizer of full-text fields.
pub const TEXT_TOKENIZER: &str = "streamdex_text";
/// Tokenizer of tag fields: the whole value, lowercased.
pub const TAG_TOKENIZER: &str = "streamdex_tag";

/// Register the analyzers the entity schemas refer to. Must run on every
/// create and open, since tantivy does not persist custom tokenizers. The
/// tag analyzer doubles as the normalizer of sortable text fast fields.
pub fn register_tokenizers(index: &tantivy::Index) {
    let text = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build();
    index.tokenizers().register(TEXT_TOKENIZER, text);

    let tag = TextAnalyzer::builder(RawTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(TAG_TOKENIZER, tag.clone());
    index.fast_field_tokenizer().register(TAG_TOKENIZER, tag);
}

/// Tantivy fields of one entity index, resolved by name.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub id: Field,
    pub source: Field,
    pub fields: Vec<(FieldSpec, Field)>,
}

impl EntitySchema {
    /// Static tantivy schema for `entity`: the raw `_id` key, the stored
    /// `_source` JSON and one field per declared field.
    pub fn build(entity: &EntityType) -> TantivySchema {
        let mut builder = TantivySchema::builder();
        builder.add_text_field(ID_FIELD, STRING | STORED);
        builder.add_text_field(SOURCE_FIELD, STORED);

        for spec in &entity.fields {
            match spec.kind {
                FieldKind::Text { .. } => {
                    let indexing = TextFieldIndexing::default()
                        .set_tokenizer(TEXT_TOKENIZER)
                        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
                    let options = TextOptions::default()
                        .set_indexing_options(indexing)
                        .set_stored();
                    let options = if spec.sortable {
                        options.set_fast(Some(TAG_TOKENIZER))
                    } else {
                        options
                    };
                    builder.add_text_field(&spec.name, options);
                }
                FieldKind::Tag => {
                    let indexing = TextFieldIndexing::default()
                        .set_tokenizer(TAG_TOKENIZER)
                        .set_index_option(IndexRecordOption::Basic);
                    let options = TextOptions::default()
                        .set_indexing_options(indexing)
                        .set_stored();
                    builder.add_text_field(&spec.name, options);
                }
                FieldKind::Numeric => {
                    let options = NumericOptions::default().set_indexed().set_stored();
                    let options = if spec.sortable {
                        options.set_fast()
                    } else {
                        options
                    };
                    builder.add_f64_field(&spec.name, options);
                }
                FieldKind::Stored => {
                    builder.add_text_field(&spec.name, STORED);
                }
            }
        }

        builder.build()
    }

    pub fn resolve(entity: &EntityType, schema: &TantivySchema) -> Result<Self> {
        let lookup = |name: &str| {
            schema.get_field(name).map_err(|_| {
                StreamdexError::FieldNotFound(format!("{}.{}", entity.name, name))
            })
        };

        let fields = entity
            .fields
            .iter()
            .map(|spec| Ok((spec.clone(), lookup(&spec.name)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(EntitySchema {
            id: lookup(ID_FIELD)?,
            source: lookup(SOURCE_FIELD)?,
            fields,
        })
    }

    /// The declared field `name`, if results can be ordered by it.
    pub fn sort_field(&self, entity: &str, name: &str) -> Result<&FieldSpec> {
        let spec = self
            .fields
            .iter()
            .map(|(spec, _)| spec)
            .find(|spec| spec.name == name)
            .ok_or_else(|| StreamdexError::FieldNotFound(format!("{}.{}", entity, name)))?;
        if !spec.sortable {
            return Err(StreamdexError::QueryParse(format!(
                "field '{}' of {} is not sortable",
                name, entity
            )));
        }
        Ok(spec)
    }

    /// Full-text fields with their query-time boost.
    pub fn text_fields(&self) -> Vec<(Field, f32)> {
        self.fields
            .iter()
            .filter_map(|(spec, field)| match spec.kind {
                FieldKind::Text { weight } => Some((*field, weight)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tantivy::schema::FieldType;

    #[test]
    fn test_movie_schema_fields() {
        let movies = EntityType::movies();
        let schema = EntitySchema::build(&movies);

        let title = schema.get_field("title").unwrap();
        assert!(matches!(
            schema.get_field_entry(title).field_type(),
            FieldType::Str(_)
        ));
        let rating = schema.get_field("rating").unwrap();
        let entry = schema.get_field_entry(rating);
        assert!(matches!(entry.field_type(), FieldType::F64(_)));
        assert!(entry.is_fast());
        assert!(entry.is_stored());

        let poster = schema.get_field("poster").unwrap();
        assert!(!schema.get_field_entry(poster).is_indexed());

        // sortable text gets a fast column, plain text does not
        assert!(schema.get_field_entry(title).is_fast());
        let plot = schema.get_field("plot").unwrap();
        assert!(!schema.get_field_entry(plot).is_fast());
    }

    #[test]
    fn test_sort_field_must_be_sortable() {
        let movies = EntityType::movies();
        let resolved = EntitySchema::resolve(&movies, &EntitySchema::build(&movies)).unwrap();

        assert_eq!(resolved.sort_field("movies", "rating").unwrap().name, "rating");
        assert!(matches!(
            resolved.sort_field("movies", "votes").unwrap_err(),
            StreamdexError::QueryParse(_)
        ));
        assert!(matches!(
            resolved.sort_field("movies", "budget").unwrap_err(),
            StreamdexError::FieldNotFound(_)
        ));
    }

    #[test]
    fn test_resolve_collects_text_fields_with_boost() {
        let movies = EntityType::movies();
        let schema = EntitySchema::build(&movies);
        let resolved = EntitySchema::resolve(&movies, &schema).unwrap();

        let boosts: Vec<f32> = resolved.text_fields().iter().map(|(_, w)| *w).collect();
        assert_eq!(boosts, vec![1.0, 0.5]);
        assert_eq!(resolved.fields.len(), movies.fields.len());
    }

    #[test]
    fn test_resolve_reports_missing_field() {
        let movies = EntityType::movies();
        let schema = EntitySchema::build(&EntityType::actors());

        let err = EntitySchema::resolve(&movies, &schema).unwrap_err();
        assert!(matches!(err, StreamdexError::FieldNotFound(_)));
    }
}
