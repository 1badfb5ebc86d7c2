use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, feedback, health, retrain};
use crate::state::AppState;

/// Creates the application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware
/// - Health and status endpoints
/// - Chat, feedback and retrain endpoints
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server.cors_allowed_origins);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/status", get(health::get_status))
        .route("/api/chat", post(chat::chat))
        .route("/api/feedback", post(feedback::feedback))
        .route("/api/retrain", post(retrain::retrain))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(configured: &[String]) -> CorsLayer {
    let allowed_origins = resolve_allowed_origins(configured)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

fn resolve_allowed_origins(configured: &[String]) -> Vec<String> {
    let origins = configured
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins();
    }

    origins
}

fn default_local_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://localhost:3000".to_string(),
        "http://localhost:5000".to_string(),
        "http://localhost:5173".to_string(),
        "http://127.0.0.1".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://127.0.0.1:5000".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}
