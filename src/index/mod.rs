//! Full-text search index, one tantivy index per entity type.

pub mod document;
pub mod schema;

pub use document::IndexedDocument;

use crate::error::{Result, StreamdexError};
use crate::projector::{EntityRegistry, EntityType, FieldKind, Projection};
use crate::types::{FeatureFlags, Operation, SearchHit, SearchResult, SortBy};
use dashmap::DashMap;
use schema::EntitySchema;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, Query, QueryParser, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{DocAddress, IndexReader, IndexWriter, Order, ReloadPolicy, TantivyDocument, Term};

const MAX_LIMIT: usize = 1000;

/// What [`SearchIndexManager::apply`] did with a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Full-text indexing is disabled for the session.
    Skipped,
    Upserted,
    Removed,
}

/// An open tantivy index for one entity type.
pub struct EntityIndex {
    entity: EntityType,
    inner: tantivy::Index,
    reader: IndexReader,
    schema: EntitySchema,
    writer: Mutex<IndexWriter>,
}

impl EntityIndex {
    pub const DEFAULT_BUFFER_SIZE: usize = 20_000_000;

    /// Open the index at `path`, creating it from the entity schema when the
    /// directory holds no index yet.
    pub fn open_or_create(entity: &EntityType, path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let inner = if path.join("meta.json").exists() {
            tantivy::Index::open_in_dir(path)?
        } else {
            tracing::info!("[IDX {}] creating index at {}", entity.name, path.display());
            tantivy::Index::create_in_dir(path, EntitySchema::build(entity))?
        };
        schema::register_tokenizers(&inner);

        let schema = EntitySchema::resolve(entity, &inner.schema())?;
        let reader = inner
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer = inner.writer_with_num_threads(1, Self::DEFAULT_BUFFER_SIZE)?;

        Ok(EntityIndex {
            entity: entity.clone(),
            inner,
            reader,
            schema,
            writer: Mutex::new(writer),
        })
    }

    pub fn entity(&self) -> &EntityType {
        &self.entity
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    fn id_term(&self, doc_id: &str) -> Term {
        Term::from_field_text(self.schema.id, doc_id)
    }

    fn with_writer<T>(&self, f: impl FnOnce(&mut IndexWriter) -> Result<T>) -> Result<T> {
        let mut writer = self.writer.lock().map_err(|_| {
            StreamdexError::Tantivy(format!("writer lock poisoned for {}", self.entity.name))
        })?;
        let out = f(&mut writer)?;
        writer.commit()?;
        drop(writer);
        self.reader.reload()?;
        Ok(out)
    }

    /// Replace the document `doc_id` with `fields`.
    pub fn upsert(&self, doc_id: &str, fields: &indexmap::IndexMap<String, String>) -> Result<()> {
        let doc = document::to_tantivy(&self.schema, doc_id, fields)?;
        let term = self.id_term(doc_id);
        self.with_writer(|writer| {
            writer.delete_term(term);
            writer.add_document(doc)?;
            Ok(())
        })
    }

    pub fn remove(&self, doc_id: &str) -> Result<()> {
        let term = self.id_term(doc_id);
        self.with_writer(|writer| {
            writer.delete_term(term);
            Ok(())
        })
    }

    pub fn get(&self, doc_id: &str) -> Result<Option<IndexedDocument>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(self.id_term(doc_id), IndexRecordOption::Basic);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

        match top_docs.first() {
            Some((_, address)) => {
                let doc: TantivyDocument = searcher.doc(*address)?;
                Ok(Some(document::from_tantivy(&self.schema, &doc)?))
            }
            None => Ok(None),
        }
    }

    pub fn doc_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Run `query` over the text fields. `*` or an empty query matches
    /// every document. Hits are ranked by relevance unless `sort` names a
    /// sortable field.
    pub fn search(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
        sort: Option<&SortBy>,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        let limit = limit.clamp(1, MAX_LIMIT);
        let trimmed = query.trim();

        let parsed: Box<dyn Query> = if trimmed.is_empty() || trimmed == "*" {
            Box::new(AllQuery)
        } else {
            let text_fields = self.schema.text_fields();
            let mut parser = QueryParser::for_index(
                &self.inner,
                text_fields.iter().map(|(field, _)| *field).collect(),
            );
            for (field, weight) in &text_fields {
                parser.set_field_boost(*field, *weight);
            }
            parser.parse_query(trimmed)?
        };

        let searcher = self.reader.searcher();
        let top = TopDocs::with_limit(limit).and_offset(offset);
        let (total, top_docs): (usize, Vec<(f32, DocAddress)>) = match sort {
            None => searcher.search(parsed.as_ref(), &(Count, top))?,
            Some(sort) => {
                let spec = self.schema.sort_field(&self.entity.name, &sort.field)?;
                let order = if sort.ascending {
                    Order::Asc
                } else {
                    Order::Desc
                };
                match spec.kind {
                    FieldKind::Numeric => {
                        let (total, docs): (usize, Vec<(f64, DocAddress)>) = searcher.search(
                            parsed.as_ref(),
                            &(Count, top.order_by_fast_field::<f64>(&sort.field, order)),
                        )?;
                        (total, docs.into_iter().map(|(_, a)| (0.0, a)).collect())
                    }
                    _ => {
                        let (total, docs): (usize, Vec<(String, DocAddress)>) = searcher.search(
                            parsed.as_ref(),
                            &(Count, top.order_by_string_fast_field(&sort.field, order)),
                        )?;
                        (total, docs.into_iter().map(|(_, a)| (0.0, a)).collect())
                    }
                }
            }
        };

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let stored = document::from_tantivy(&self.schema, &doc)?;
            hits.push(SearchHit {
                id: stored.id,
                score,
                fields: stored.fields,
            });
        }

        let took_ms = started.elapsed().as_millis();
        tracing::debug!(
            "[IDX {}] query={:?} sort={:?} total={} took={}ms",
            self.entity.name,
            trimmed,
            sort,
            total,
            took_ms
        );

        Ok(SearchResult {
            query: query.to_string(),
            total,
            offset,
            limit,
            took_ms,
            hits,
        })
    }
}

/// Owns the entity indexes under one base directory.
///
/// Indexes are opened lazily on first use, or all at once by
/// [`SearchIndexManager::bootstrap`].
pub struct SearchIndexManager {
    base_dir: PathBuf,
    registry: Arc<EntityRegistry>,
    indexes: DashMap<String, Arc<EntityIndex>>,
}

impl SearchIndexManager {
    pub fn open(base_dir: impl AsRef<Path>, registry: Arc<EntityRegistry>) -> Result<Arc<Self>> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Arc::new(SearchIndexManager {
            base_dir,
            registry,
            indexes: DashMap::new(),
        }))
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Ensure an index exists for every registered entity type.
    pub fn bootstrap(&self) -> Result<()> {
        for entity in self.registry.iter() {
            self.index(&entity.name)?;
        }
        tracing::info!(
            "[IDX] bootstrapped {} indexes under {}",
            self.indexes.len(),
            self.base_dir.display()
        );
        Ok(())
    }

    pub fn index(&self, entity: &str) -> Result<Arc<EntityIndex>> {
        let entity_type = self
            .registry
            .get(entity)
            .ok_or_else(|| StreamdexError::UnknownEntity(entity.to_string()))?;

        if let Some(index) = self.indexes.get(&entity_type.name) {
            return Ok(Arc::clone(&index));
        }

        let entry = self.indexes.entry(entity_type.name.clone());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(o) => Ok(Arc::clone(o.get())),
            dashmap::mapref::entry::Entry::Vacant(v) => {
                let path = self
                    .base_dir
                    .join(crate::utils::path_component(&entity_type.name));
                let index = Arc::new(EntityIndex::open_or_create(entity_type, &path)?);
                v.insert(Arc::clone(&index));
                Ok(index)
            }
        }
    }

    /// Apply one projected change to the entity's index.
    pub fn apply(
        &self,
        entity: &str,
        projection: &Projection,
        flags: &FeatureFlags,
    ) -> Result<ApplyOutcome> {
        if !flags.fulltext {
            return Ok(ApplyOutcome::Skipped);
        }

        let index = self.index(entity)?;
        let result = match projection.operation {
            Operation::Create | Operation::Update => index
                .upsert(&projection.doc_id, &projection.document_fields())
                .map(|_| ApplyOutcome::Upserted),
            Operation::Delete => index
                .remove(&projection.doc_id)
                .map(|_| ApplyOutcome::Removed),
        };

        match &result {
            Ok(outcome) => tracing::debug!(
                "[IDX {}] {:?} {}",
                entity,
                outcome,
                projection.doc_id
            ),
            Err(e) => tracing::error!(
                "[IDX {}] failed to apply {} {}: {}",
                entity,
                projection.operation,
                projection.doc_id,
                e
            ),
        }
        result
    }

    /// Fetch a document by primary key. A full `{key_prefix}:{key}` id is
    /// accepted as well.
    pub fn get(&self, entity: &str, key: &str) -> Result<Option<IndexedDocument>> {
        let index = self.index(entity)?;
        let prefix = format!("{}:", index.entity().key_prefix);
        let doc_id = if key.starts_with(&prefix) {
            key.to_string()
        } else {
            index.entity().doc_id(key)
        };
        index.get(&doc_id)
    }

    pub fn search(
        &self,
        entity: &str,
        query: &str,
        offset: usize,
        limit: usize,
        sort: Option<&SortBy>,
    ) -> Result<SearchResult> {
        self.index(entity)?.search(query, offset, limit, sort)
    }

    pub fn doc_count(&self, entity: &str) -> Result<u64> {
        Ok(self.index(entity)?.doc_count())
    }
}
