//! # Streamdex
//!
//! Keeps a full-text search index and an autocomplete dictionary in sync
//! with a relational source, using an ordered change log as the only
//! integration point. Built on [Tantivy](https://github.com/quickwit-oss/tantivy).
//!
//! Capture records (Debezium JSON) are normalized into change events and
//! appended to a per-table topic. Two consumer groups read every topic
//! independently: one maintains the search index, the other the suggestion
//! dictionary. Entries are acknowledged only after they were applied, so
//! delivery is at-least-once and every downstream write is idempotent.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use streamdex::{Pipeline, RawRecord, StreamdexConfig};
//! use serde_json::json;
//!
//! # fn main() -> streamdex::Result<()> {
//! let pipeline = Pipeline::open(StreamdexConfig::for_dir("./data"))?;
//!
//! pipeline.publisher().publish(&RawRecord {
//!     topic: Some("dbserver1.inventory.movies".into()),
//!     key: Some(json!({"movie_id": 1})),
//!     value: Some(json!({
//!         "before": null,
//!         "after": {"movie_id": 1, "title": "Alien", "genre": "Sci-Fi"},
//!         "source": {"db": "inventory", "table": "movies"},
//!         "op": "c"
//!     })),
//! })?;
//!
//! pipeline.indexer().start()?;
//! // ... later
//! let hits = pipeline.search().search("movies", "alien", 0, 10, None)?;
//! println!("{} hits", hits.total);
//! pipeline.indexer().stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Dependencies | Use case |
//! |---------|-------------|----------|
//! | `axum-support` | axum | [`StreamdexError`] implements `IntoResponse` |

pub mod cdc;
pub mod config;
pub mod error;
pub mod index;
pub mod log;
pub mod pipeline;
pub mod projector;
pub mod stream;
pub mod suggest;
pub mod types;
mod utils;

pub use cdc::{ChangeEvent, ChangeEventPublisher, Normalizer, RawRecord, SourceFilter};
pub use config::StreamdexConfig;
pub use error::{Result, StreamdexError};
pub use index::{ApplyOutcome, IndexedDocument, SearchIndexManager};
pub use log::{ChangeLog, FileChangeLog, GroupCreated, PendingEntry, StartPosition, StreamEntry};
pub use pipeline::Pipeline;
pub use projector::{project, EntityRegistry, EntityType, FieldKind, FieldSpec, LabelRule, Projection};
pub use stream::{IndexerStatus, StreamIndexer, ToggleOutcome};
pub use suggest::{
    FileSuggestionStore, SuggestOptions, SuggestOutcome, SuggestionIndexManager, SuggestionStore,
};
pub use types::*;
