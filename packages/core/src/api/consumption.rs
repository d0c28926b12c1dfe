//! Internal ingestion endpoints fed by the reading source and the forecast job.
//!
//! Range validation of consumption values lives here: the engine accepts
//! any finite value, the HTTP boundary only non-negative ones.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::{error_body, error_response, ApiError, ApiState};
use crate::thresholds::{
    ConsumptionContext, EvaluationContext, ForecastAggregation, PeriodType, Threshold,
    ThresholdType, UtilityReadings, UtilityType,
};

pub fn create_consumption_router() -> Router<ApiState> {
    Router::new()
        .route("/internal/consumption", post(evaluate_consumption))
        .route("/internal/consumption/batch", post(evaluate_batch))
        .route("/internal/readings", post(process_readings))
        .route(
            "/internal/thresholds/evaluations/forecast",
            post(evaluate_forecast),
        )
}

// ---- Request / response shapes ----

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub consumptions: Vec<ConsumptionContext>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingsRequest {
    pub readings: UtilityReadings,
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRequest {
    pub utility_type: UtilityType,
    pub aggregations: Vec<ForecastAggregation>,
}

#[derive(Debug, Serialize)]
pub struct BreachesResponse {
    pub breached: Vec<Threshold>,
}

#[derive(Debug, Serialize)]
pub struct ReadingsAccepted {
    pub evaluated: usize,
    pub breached: Vec<Threshold>,
}

// ---- Helpers ----

fn check_value(field: &str, value: f64) -> Result<(), ApiError> {
    if value.is_finite() && value >= 0.0 {
        return Ok(());
    }
    Err(error_body(
        StatusCode::BAD_REQUEST,
        format!("{} must be a finite, non-negative number (got {})", field, value),
    ))
}

// ---- Handlers ----

/// `POST /internal/consumption`: evaluate one sample; failures propagate.
pub async fn evaluate_consumption(
    State(state): State<ApiState>,
    Json(sample): Json<ConsumptionContext>,
) -> Result<Json<BreachesResponse>, ApiError> {
    check_value("value", sample.value)?;
    let breached = state.evaluator.evaluate(sample).await.map_err(error_response)?;
    Ok(Json(BreachesResponse { breached }))
}

/// `POST /internal/consumption/batch`: per-item failures are logged, not returned.
pub async fn evaluate_batch(
    State(state): State<ApiState>,
    Json(body): Json<BatchRequest>,
) -> Result<Json<BreachesResponse>, ApiError> {
    for (i, sample) in body.consumptions.iter().enumerate() {
        check_value(&format!("consumptions[{}].value", i), sample.value)?;
    }
    let breached = state.evaluator.evaluate_batch(body.consumptions).await;
    Ok(Json(BreachesResponse { breached }))
}

/// `POST /internal/readings`: fan out one evaluation per present utility.
pub async fn process_readings(
    State(state): State<ApiState>,
    Json(body): Json<ReadingsRequest>,
) -> Result<(StatusCode, Json<ReadingsAccepted>), ApiError> {
    let readings = [
        ("readings.electricity", body.readings.electricity),
        ("readings.water", body.readings.water),
        ("readings.gas", body.readings.gas),
    ];
    let mut evaluated = 0;
    for (field, reading) in readings {
        if let Some(reading) = reading {
            check_value(field, reading.value)?;
            evaluated += 1;
        }
    }

    let context = EvaluationContext {
        threshold_type: body.threshold_type,
        period_type: body.period_type,
    };
    let breached = state.evaluator.process_readings(&body.readings, context).await;
    Ok((StatusCode::ACCEPTED, Json(ReadingsAccepted { evaluated, breached })))
}

/// `POST /internal/thresholds/evaluations/forecast`: FORECAST thresholds
/// against per-period aggregates; the first failure is returned.
pub async fn evaluate_forecast(
    State(state): State<ApiState>,
    Json(body): Json<ForecastRequest>,
) -> Result<Json<BreachesResponse>, ApiError> {
    for (i, aggregation) in body.aggregations.iter().enumerate() {
        check_value(&format!("aggregations[{}].value", i), aggregation.value)?;
    }
    let breached = state
        .evaluator
        .evaluate_forecast(body.utility_type, &body.aggregations)
        .await
        .map_err(error_response)?;
    Ok(Json(BreachesResponse { breached }))
}
