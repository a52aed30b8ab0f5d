use axum::{extract::State, Json};
use std::sync::Arc;
use streamdex::{RawRecord, StreamdexError};

use super::{blocking, AppState};
use crate::dto::IngestResponse;

/// Normalize one capture record and append it to its table's topic.
/// Records the normalizer filters out are accepted with `published: false`.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(record): Json<RawRecord>,
) -> Result<Json<IngestResponse>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let id = blocking(move || pipeline.publisher().publish(&record)).await?;

    Ok(Json(IngestResponse {
        published: id.is_some(),
        id,
    }))
}
