use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use super::utils::{field, json_object};
use crate::core::errors::ApiError;
use crate::state::AppState;

const DEFAULT_SESSION_ID: &str = "default";

pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_object(payload)?;

    let message = match field(&body, "message") {
        None => return Err(ApiError::BadRequest("No message provided".to_string())),
        Some(Value::String(message)) => message.clone(),
        Some(_) => return Err(ApiError::BadRequest("'message' must be a string".to_string())),
    };
    let session_id = match field(&body, "session_id") {
        None => DEFAULT_SESSION_ID.to_string(),
        Some(Value::String(session_id)) => session_id.clone(),
        Some(_) => {
            return Err(ApiError::BadRequest(
                "'session_id' must be a string".to_string(),
            ))
        }
    };

    let answer = state.pipeline.answer(&message).await?;

    state
        .recorder
        .record_interaction(session_id.clone(), message, answer.response.clone());

    let mut response = json!({
        "response": answer.response,
        "session_id": session_id,
    });
    if !answer.warnings.is_empty() {
        response["warnings"] = json!(answer.warnings);
    }

    Ok(Json(response))
}
