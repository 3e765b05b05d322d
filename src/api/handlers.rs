//! Application state, router assembly, and the small GET endpoints.

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::core::logging::request_id_middleware;
use crate::core::metrics::track_metrics;
use crate::services::catalog::ModelCatalog;
use crate::services::upstream::UpstreamClient;
use crate::services::user::UserService;
use crate::transformer::normalize::Normalizer;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared state wired once at startup.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub upstream: Arc<UpstreamClient>,
    pub catalog: Arc<ModelCatalog>,
    pub users: Arc<UserService>,
    pub normalizer: Normalizer,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let config = Arc::new(config);
        let upstream = Arc::new(UpstreamClient::new(config.clone()));
        let catalog = Arc::new(ModelCatalog::new(config.clone(), upstream.clone()));
        let users = Arc::new(UserService::new(config.clone(), upstream.clone()));
        let normalizer = Normalizer::new(config.clone(), catalog.clone(), upstream.clone());
        Self {
            config,
            upstream,
            catalog,
            users,
            normalizer,
        }
    }
}

/// Build the router with all endpoints and middleware layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(super::chat::chat_completions))
        .route("/v1/messages", post(super::messages::anthropic_messages))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis()
    }))
}

/// Model listing in OpenAI form, backed by the cached catalog.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Result<Response> {
    let user = state.users.get_user().await?;
    let models = state.catalog.openai_list(&user).await?;
    Ok(Json(models).into_response())
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let body = encoder
        .encode_to_string(&metric_families)
        .map_err(|e| crate::core::error::AppError::Internal(e.to_string()))?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(body.into())
        .unwrap())
}
