use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use super::utils::{field, identifier, json_object};
use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn feedback(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_object(payload)?;

    let (Some(session_id), Some(message_id), Some(rating)) = (
        field(&body, "session_id"),
        field(&body, "message_id"),
        field(&body, "rating"),
    ) else {
        return Err(ApiError::BadRequest("Missing required fields".to_string()));
    };

    let rating = rating
        .as_f64()
        .ok_or_else(|| ApiError::BadRequest("'rating' must be a number".to_string()))?;
    let comment = field(&body, "comment").map(|value| match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    });

    state.recorder.record_feedback(
        identifier(session_id),
        identifier(message_id),
        rating,
        comment,
    );

    Ok(Json(json!({ "status": "success" })))
}
