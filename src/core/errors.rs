use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

use crate::llm::GenerationError;
use crate::pipeline::PipelineError;
use crate::retrieval::RetrievalError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad gateway: {0}")]
    BadGateway(String),
    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Timeout(_) => ApiError::GatewayTimeout(err.to_string()),
            GenerationError::Unavailable(_) | GenerationError::EmptyOutput => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        ApiError::ServiceUnavailable(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Retrieval(err) => err.into(),
            PipelineError::Generation(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::BadGateway(msg)
            | ApiError::GatewayTimeout(msg)
            | ApiError::Internal(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(status = %status, "{}", message);
        } else {
            tracing::debug!(status = %status, "{}", message);
        }

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
