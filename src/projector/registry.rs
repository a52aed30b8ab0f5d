use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How a field is indexed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Tokenized full-text field; `weight` boosts matches at query time.
    Text { weight: f32 },
    /// Exact-match keyword.
    Tag,
    /// Numeric value, parsed as f64.
    Numeric,
    /// Stored only, not searchable.
    Stored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sortable: bool,
    /// Filled from the label rule instead of the stream entry.
    #[serde(default)]
    pub computed: bool,
}

impl FieldSpec {
    fn new(name: &str, kind: FieldKind) -> Self {
        FieldSpec {
            name: name.to_string(),
            kind,
            required: false,
            sortable: false,
            computed: false,
        }
    }

    pub fn text(name: &str, weight: f32) -> Self {
        Self::new(name, FieldKind::Text { weight })
    }

    pub fn tag(name: &str) -> Self {
        Self::new(name, FieldKind::Tag)
    }

    pub fn numeric(name: &str) -> Self {
        Self::new(name, FieldKind::Numeric)
    }

    pub fn stored(name: &str) -> Self {
        Self::new(name, FieldKind::Stored)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }
}

/// How the suggestion label of an entity is derived from its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LabelRule {
    /// The value of a single field.
    Field { field: String },
    /// `"{first} {last}"`, with `placeholder` standing in for a missing or
    /// blank last part. The result is also indexed under `target`.
    FullName {
        first: String,
        last: String,
        placeholder: String,
        target: String,
    },
}

impl LabelRule {
    /// Compute the label from a field map. `None` when the fields the label
    /// needs are absent.
    pub fn compute(&self, fields: &IndexMap<String, String>) -> Option<String> {
        match self {
            LabelRule::Field { field } => fields.get(field).cloned(),
            LabelRule::FullName {
                first,
                last,
                placeholder,
                ..
            } => {
                let first = fields.get(first)?;
                let last = fields
                    .get(last)
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .unwrap_or(placeholder.as_str());
                Some(format!("{} {}", first, last))
            }
        }
    }

    /// Field name the computed label is indexed under, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            LabelRule::Field { .. } => None,
            LabelRule::FullName { target, .. } => Some(target.as_str()),
        }
    }
}

/// Static description of one indexed entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    /// Source table name, also the index name.
    pub name: String,
    pub primary_key: String,
    /// Documents are keyed `{key_prefix}:{primary_key}`.
    pub key_prefix: String,
    pub fields: Vec<FieldSpec>,
    pub label: LabelRule,
}

impl EntityType {
    pub fn movies() -> Self {
        EntityType {
            name: "movies".to_string(),
            primary_key: "movie_id".to_string(),
            key_prefix: "ms:docs:movies".to_string(),
            fields: vec![
                FieldSpec::numeric("movie_id").required().sortable(),
                FieldSpec::text("title", 1.0).required().sortable(),
                FieldSpec::tag("genre").required(),
                FieldSpec::numeric("votes"),
                FieldSpec::numeric("rating").sortable(),
                FieldSpec::numeric("release_year").sortable(),
                FieldSpec::text("plot", 0.5),
                FieldSpec::stored("poster"),
            ],
            label: LabelRule::Field {
                field: "title".to_string(),
            },
        }
    }

    pub fn actors() -> Self {
        EntityType {
            name: "actors".to_string(),
            primary_key: "actor_id".to_string(),
            key_prefix: "ms:docs:actors".to_string(),
            fields: vec![
                FieldSpec::numeric("actor_id").required(),
                FieldSpec::text("first_name", 1.0).required(),
                FieldSpec::text("last_name", 1.0),
                FieldSpec::tag("dob"),
                FieldSpec::text("full_name", 1.0).computed(),
            ],
            label: LabelRule::FullName {
                first: "first_name".to_string(),
                last: "last_name".to_string(),
                placeholder: "-".to_string(),
                target: "full_name".to_string(),
            },
        }
    }

    pub fn doc_id(&self, primary_key: &str) -> String {
        format!("{}:{}", self.key_prefix, primary_key)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields read from stream entries, in declaration order.
    pub fn source_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| !f.computed)
    }

    pub fn text_fields(&self) -> impl Iterator<Item = (&FieldSpec, f32)> {
        self.fields.iter().filter_map(|f| match f.kind {
            FieldKind::Text { weight } => Some((f, weight)),
            _ => None,
        })
    }
}

/// Entity types keyed by lowercase table name.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    types: IndexMap<String, EntityType>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `movies` and `actors`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(EntityType::movies());
        registry.register(EntityType::actors());
        registry
    }

    /// Add or replace an entity type.
    pub fn register(&mut self, entity: EntityType) {
        self.types.insert(entity.name.to_lowercase(), entity);
    }

    pub fn get(&self, table: &str) -> Option<&EntityType> {
        self.types.get(&table.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityType> {
        self.types.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.types.values().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
