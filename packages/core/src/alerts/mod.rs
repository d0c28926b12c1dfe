//! Outbound notification adapters and their shared payload shape.

pub mod publisher;
pub mod webhook;

use serde::Serialize;

use crate::thresholds::{PeriodType, Threshold, ThresholdType, UtilityType};

/// Wire view of a threshold as published to downstream services.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdEvent {
    pub threshold_id: String,
    pub threshold_name: String,
    pub utility_type: UtilityType,
    pub threshold_type: ThresholdType,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_type: Option<PeriodType>,
}

impl From<&Threshold> for ThresholdEvent {
    fn from(threshold: &Threshold) -> Self {
        Self {
            threshold_id: threshold.id().to_string(),
            threshold_name: threshold.name().to_string(),
            utility_type: threshold.utility_type(),
            threshold_type: threshold.threshold_type(),
            value: threshold.value().get(),
            period_type: threshold.period_type(),
        }
    }
}
