use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let provider = state.pipeline.generator().provider();
    let reachable = tokio::time::timeout(HEALTH_CHECK_TIMEOUT, provider.health_check())
        .await
        .unwrap_or(false);

    Json(json!({
        "knowledge_bases": state.knowledge.snapshot(),
        "recorder": state.recorder.stats(),
        "generation": {
            "provider": provider.name(),
            "reachable": reachable,
            "timeout_secs": state.settings.generation.timeout_secs,
        },
        "retrieval": {
            "top_k": state.settings.retrieval.top_k,
        },
    }))
}
