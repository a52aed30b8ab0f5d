use std::sync::Arc;
use streamdex::{Pipeline, StreamdexError};

pub mod cdc;
pub mod health;
pub mod indexer;
pub mod query;
pub mod streams;

pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// Run blocking pipeline work (thread joins, disk writes) off the async
/// executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, StreamdexError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StreamdexError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StreamdexError::Io(format!("blocking task failed: {}", e)))?
}

pub use cdc::ingest;
pub use health::health;
pub use indexer::{indexer_status, start_indexer, stop_indexer, toggle_fulltext, toggle_suggest};
pub use query::{get_document, search, suggest};
pub use streams::{ack_entry, list_pending, trim_topic};
