use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use streamdex::{IndexedDocument, SearchResult, StreamdexError};

use super::{blocking, AppState};
use crate::dto::{SearchParams, SuggestParams, SuggestResponse, DEFAULT_SEARCH_LIMIT};

pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResult>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let result = blocking(move || {
        let sort = params.sort();
        pipeline.search().search(
            &entity,
            params.q.as_deref().unwrap_or(""),
            params.offset.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            sort.as_ref(),
        )
    })
    .await?;
    Ok(Json(result))
}

pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
    Query(params): Query<SuggestParams>,
) -> Result<Json<SuggestResponse>, StreamdexError> {
    // only registered entity types have a dictionary
    if state.pipeline.search().registry().get(&entity).is_none() {
        return Err(StreamdexError::UnknownEntity(entity));
    }

    let query = params.q.clone().unwrap_or_default();
    let pipeline = Arc::clone(&state.pipeline);
    let (e, q) = (entity.clone(), query.clone());
    let suggestions =
        blocking(move || pipeline.suggest().suggest(&e, &q, params.options())).await?;
    Ok(Json(SuggestResponse {
        entity,
        query,
        suggestions,
    }))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Json<IndexedDocument>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let (e, key) = (entity.clone(), id.clone());
    match blocking(move || pipeline.search().get(&e, &key)).await? {
        Some(doc) => Ok(Json(doc)),
        None => Err(StreamdexError::DocumentNotFound { entity, id }),
    }
}
