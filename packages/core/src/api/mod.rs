//! HTTP surface: health, metrics, threshold CRUD and consumption ingestion.

pub mod consumption;
pub mod health;
pub mod thresholds;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::metrics::AppMetrics;
use crate::thresholds::{ConsumptionEvaluator, ThresholdError, ThresholdService};

/// Error shape shared by every handler: status plus `{"error": msg}`.
pub type ApiError = (StatusCode, Json<Value>);

/// Everything the handlers need. Cheap to clone.
#[derive(Clone)]
pub struct ApiState {
    pub thresholds: ThresholdService,
    pub evaluator: ConsumptionEvaluator,
    pub metrics: Arc<AppMetrics>,
}

pub fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

/// Map a domain error onto its HTTP status.
pub fn error_response(err: ThresholdError) -> ApiError {
    let status = match &err {
        ThresholdError::NotFound { .. } => StatusCode::NOT_FOUND,
        ThresholdError::AlreadyExists { .. } => StatusCode::CONFLICT,
        ThresholdError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        e if e.is_validation() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    error_body(status, err.to_string())
}

/// Assemble the full application router.
pub fn create_router(state: ApiState) -> Router {
    let metrics = state.metrics.clone();

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .merge(thresholds::create_thresholds_router())
        .merge(consumption::create_consumption_router())
        .route_layer(middleware::from_fn_with_state(metrics, track_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Count and time every routed request, labelled by route template.
async fn track_requests(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();
    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    response
}
