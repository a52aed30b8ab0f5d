use axum::{extract::State, Json};
use std::sync::Arc;

use super::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.pipeline.indexer().status();

    Json(serde_json::json!({
        "status": "ok",
        "indexer": status.state,
        "streams": state.pipeline.config().streams,
        "build_profile": if cfg!(debug_assertions) { "debug" } else { "release" },
    }))
}
