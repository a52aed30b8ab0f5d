use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;
use streamdex::{IndexerStatus, StreamdexError, ToggleOutcome};

use super::{blocking, AppState};
use crate::dto::ToggleParams;

pub async fn start_indexer(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IndexerStatus>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let status = blocking(move || {
        pipeline.indexer().start()?;
        Ok(pipeline.indexer().status())
    })
    .await?;
    Ok(Json(status))
}

pub async fn stop_indexer(
    State(state): State<Arc<AppState>>,
) -> Result<Json<IndexerStatus>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let status = blocking(move || {
        pipeline.indexer().stop();
        Ok(pipeline.indexer().status())
    })
    .await?;
    Ok(Json(status))
}

pub async fn indexer_status(State(state): State<Arc<AppState>>) -> Json<IndexerStatus> {
    Json(state.pipeline.indexer().status())
}

pub async fn toggle_fulltext(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ToggleParams>,
) -> Result<Json<ToggleOutcome>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = blocking(move || {
        let indexer = pipeline.indexer();
        let enabled = params.enabled.unwrap_or(!indexer.flags().fulltext);
        indexer.set_fulltext_enabled(enabled)
    })
    .await?;
    Ok(Json(outcome))
}

pub async fn toggle_suggest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ToggleParams>,
) -> Result<Json<ToggleOutcome>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let outcome = blocking(move || {
        let indexer = pipeline.indexer();
        let enabled = params.enabled.unwrap_or(!indexer.flags().suggest);
        indexer.set_suggest_enabled(enabled)
    })
    .await?;
    Ok(Json(outcome))
}
