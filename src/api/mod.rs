//! HTTP control surface: manual refresh, cycle status and source management.
//!
//! Handlers only enqueue triggers; cycles always run on the refresh worker.

use crate::source::SourceRegistry;
use crate::stats::RefreshStats;
use crate::trigger::{RefreshQueue, TriggerReason};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;

struct ApiState {
    stats: Arc<RefreshStats>,
    queue: RefreshQueue,
    registry: Arc<SourceRegistry>,
}

pub fn router(
    stats: Arc<RefreshStats>,
    queue: RefreshQueue,
    registry: Arc<SourceRegistry>,
) -> Router {
    let state = Arc::new(ApiState {
        stats,
        queue,
        registry,
    });

    Router::new()
        .route("/api/refresh", post(trigger_refresh))
        .route("/api/status", get(get_status))
        .route("/api/sources", get(list_sources).post(create_source))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("API Server listening on http://{}", addr);
    }
    axum::serve(listener, app).await
}

async fn trigger_refresh(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let submission = state.queue.submit(TriggerReason::Manual);
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "submission": submission })),
    )
}

async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "stats": state.stats.get_snapshot(),
        "queue_depth": state.queue.depth(),
    }))
}

async fn list_sources(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.registry.all())
}

#[derive(serde::Deserialize)]
struct CreateSourceRequest {
    name: String,
    url: String,
}

async fn create_source(
    State(state): State<Arc<ApiState>>,
    Json(payload): Json<CreateSourceRequest>,
) -> impl IntoResponse {
    match state.registry.add(&payload.name, &payload.url, true) {
        Ok(source) => {
            state
                .queue
                .submit(TriggerReason::SourceCreated(source.name.clone()));
            (StatusCode::CREATED, Json(serde_json::json!(source)))
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
