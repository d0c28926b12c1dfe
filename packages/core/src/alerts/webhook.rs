//! Breach alert delivery over HTTP.
//!
//! Each breached threshold becomes one POST to
//! `{base_url}/api/internal/alerts`. Delivery is best effort: failures are
//! logged per threshold and never reach the evaluation engine.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::ThresholdEvent;
use crate::thresholds::{
    BreachNotifier, ConsumptionContext, NotifyError, PeriodType, Threshold, ThresholdType,
    UtilityType,
};

pub const DEFAULT_ALERT_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of one alert POST.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub threshold_id: String,
    pub threshold_name: String,
    pub utility_type: UtilityType,
    pub threshold_type: ThresholdType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_type: Option<PeriodType>,
    pub limit_value: f64,
    pub detected_value: f64,
}

impl AlertPayload {
    pub fn new(threshold: &Threshold, detected_value: f64) -> Self {
        let event = ThresholdEvent::from(threshold);
        Self {
            threshold_id: event.threshold_id,
            threshold_name: event.threshold_name,
            utility_type: event.utility_type,
            threshold_type: event.threshold_type,
            period_type: event.period_type,
            limit_value: event.value,
            detected_value,
        }
    }
}

#[derive(Clone)]
pub struct WebhookBreachNotifier {
    endpoint: String,
    timeout: Duration,
    http: Client,
}

impl WebhookBreachNotifier {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}/api/internal/alerts", base_url.trim_end_matches('/')),
            timeout,
            http: Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, payload: &AlertPayload) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    NotifyError::delivery(format!("timed out after {:?}", self.timeout))
                } else {
                    NotifyError::connection(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(NotifyError::delivery(format!(
                "alert service returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BreachNotifier for WebhookBreachNotifier {
    async fn notify_breach(
        &self,
        consumption: &ConsumptionContext,
        breached: &[Threshold],
    ) -> Result<(), NotifyError> {
        for threshold in breached {
            let payload = AlertPayload::new(threshold, consumption.value);
            match self.post(&payload).await {
                Ok(()) => tracing::debug!(threshold_id = %threshold.id(), "Breach alert delivered"),
                Err(err) => tracing::warn!(
                    threshold_id = %threshold.id(),
                    "Breach alert not delivered: {}",
                    err
                ),
            }
        }
        Ok(())
    }
}
