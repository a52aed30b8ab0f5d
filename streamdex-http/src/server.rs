use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use streamdex::Pipeline;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    ack_entry, get_document, health, indexer_status, ingest, list_pending, search, start_indexer,
    stop_indexer, suggest, toggle_fulltext, toggle_suggest, trim_topic, AppState,
};

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = Arc::new(AppState { pipeline });

    let api = Router::new()
        .route("/api/1.0/indexer/start", post(start_indexer))
        .route("/api/1.0/indexer/stop", post(stop_indexer))
        .route("/api/1.0/indexer/status", get(indexer_status))
        .route("/api/1.0/indexer/fulltext", post(toggle_fulltext))
        .route("/api/1.0/indexer/suggest", post(toggle_suggest))
        .route("/api/1.0/search/:entity", get(search))
        .route("/api/1.0/suggest/:entity", get(suggest))
        .route("/api/1.0/cdc", post(ingest))
        .route(
            "/api/1.0/streams/:topic/groups/:group/pending",
            get(list_pending),
        )
        .route(
            "/api/1.0/streams/:topic/groups/:group/ack/:id",
            post(ack_entry),
        )
        .route("/api/1.0/streams/:topic/trim", post(trim_topic))
        .route("/api/1.0/:entity/:id", get(get_document))
        .with_state(state.clone());

    let health_route = Router::new()
        .route("/health", get(health))
        .with_state(state);

    Router::new()
        .merge(health_route)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive().max_age(std::time::Duration::from_secs(86400)))
}

/// Serve the HTTP API on `bind_addr` until ctrl-c, then stop the indexer.
pub async fn serve(pipeline: Arc<Pipeline>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(Arc::clone(&pipeline));

    tracing::info!("Starting Streamdex server on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let state = tokio::task::spawn_blocking(move || pipeline.indexer().stop()).await?;
    tracing::info!("Server stopped, indexer {}", state);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
