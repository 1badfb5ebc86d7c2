use axum::extract::rejection::JsonRejection;
use axum::Json;
use serde_json::{Map, Value};

use crate::core::errors::ApiError;

/// Unwraps a JSON body, turning extractor rejections into 400s that carry
/// the parser message. Non-object bodies are treated as empty objects so
/// field checks report the missing fields.
pub fn json_object(payload: Result<Json<Value>, JsonRejection>) -> Result<Map<String, Value>, ApiError> {
    let Json(value) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// A present, non-null field.
pub fn field<'a>(body: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    body.get(key).filter(|value| !value.is_null())
}

/// Identifiers may arrive as strings or numbers.
pub fn identifier(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
