//! Threshold management endpoints.
//!
//! Routes:
//! - `POST   /thresholds`      create, 201 with the stored threshold
//! - `GET    /thresholds`      list, optional `name`, `utilityType`,
//!   `periodType`, `thresholdType` and `state` query filters
//! - `GET    /thresholds/:id`  fetch one
//! - `PUT    /thresholds/:id`  partial update; `"periodType": null` clears the period
//! - `DELETE /thresholds/:id`  204

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::api::{error_response, ApiError, ApiState};
use crate::thresholds::{NewThreshold, Threshold, ThresholdFilters, ThresholdUpdate};

pub fn create_thresholds_router() -> Router<ApiState> {
    Router::new()
        .route("/thresholds", get(list_thresholds).post(create_threshold))
        .route(
            "/thresholds/:id",
            get(get_threshold)
                .put(update_threshold)
                .delete(delete_threshold),
        )
}

pub async fn create_threshold(
    State(state): State<ApiState>,
    Json(body): Json<NewThreshold>,
) -> Result<(StatusCode, Json<Threshold>), ApiError> {
    let threshold = state.thresholds.create(body).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(threshold)))
}

pub async fn list_thresholds(
    State(state): State<ApiState>,
    Query(filters): Query<ThresholdFilters>,
) -> Result<Json<Vec<Threshold>>, ApiError> {
    let thresholds = state.thresholds.list(&filters).await.map_err(error_response)?;
    Ok(Json(thresholds))
}

pub async fn get_threshold(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Threshold>, ApiError> {
    let threshold = state.thresholds.get(&id).await.map_err(error_response)?;
    Ok(Json(threshold))
}

pub async fn update_threshold(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(patch): Json<ThresholdUpdate>,
) -> Result<Json<Threshold>, ApiError> {
    let threshold = state
        .thresholds
        .update(&id, &patch)
        .await
        .map_err(error_response)?;
    Ok(Json(threshold))
}

pub async fn delete_threshold(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.thresholds.delete(&id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
