use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use streamdex::{ChangeLog, StreamdexError};

use super::{blocking, AppState};
use crate::dto::{AckResponse, PendingResponse, TrimParams, TrimResponse};

pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    Path((topic, group)): Path<(String, String)>,
) -> Result<Json<PendingResponse>, StreamdexError> {
    let pending = state.pipeline.log().pending(&topic, &group)?;
    Ok(Json(PendingResponse {
        topic,
        group,
        pending,
    }))
}

/// Acknowledge an entry on behalf of a group. This is how an operator
/// moves a group past an entry that keeps failing.
pub async fn ack_entry(
    State(state): State<Arc<AppState>>,
    Path((topic, group, id)): Path<(String, String, u64)>,
) -> Result<Json<AckResponse>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let (t, g) = (topic.clone(), group.clone());
    let acknowledged = blocking(move || pipeline.log().acknowledge(&t, &g, id)).await?;

    if acknowledged {
        tracing::warn!("[STREAM {}] operator acknowledged {}:{}", group, topic, id);
    }
    Ok(Json(AckResponse {
        topic,
        group,
        id,
        acknowledged,
    }))
}

/// Drop sealed log segments whose entries all precede `before`.
pub async fn trim_topic(
    State(state): State<Arc<AppState>>,
    Path(topic): Path<String>,
    Query(params): Query<TrimParams>,
) -> Result<Json<TrimResponse>, StreamdexError> {
    let pipeline = Arc::clone(&state.pipeline);
    let t = topic.clone();
    let before = params.before;
    let (removed_segments, last_id) = blocking(move || {
        let removed = pipeline.log().trim_before(&t, before)?;
        Ok((removed, pipeline.log().last_id(&t)?))
    })
    .await?;

    Ok(Json(TrimResponse {
        topic,
        before,
        removed_segments,
        last_id,
    }))
}
