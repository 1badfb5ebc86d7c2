use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Rebuilds both knowledge bases from the current database contents.
pub async fn retrain(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let report = state.knowledge.rebuild_all().await;

    if !report.is_success() {
        for (name, err) in &report.failed {
            tracing::error!(knowledge_base = %name, "Retrain failed: {}", err);
        }
        let names = report
            .failed_names()
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ApiError::Internal(format!(
            "Failed to update knowledge base(s): {}",
            names
        )));
    }

    tracing::info!("Knowledge bases retrained");
    Ok(Json(json!({
        "status": "success",
        "message": "Knowledge base updated with latest data",
    })))
}
