//! Calendar-aligned re-arming of breached thresholds.
//!
//! Only period-scoped thresholds ever persist a BREACHED state. A breach
//! lapses on the boundary of its period:
//! - `ONE_DAY`   every invocation
//! - `ONE_WEEK`  on Mondays
//! - `ONE_MONTH` on the 1st of the month

use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate, Weekday};
use tokio::task::JoinSet;

use crate::metrics::AppMetrics;
use crate::thresholds::{
    error::ThresholdError,
    model::{Threshold, ThresholdUpdate},
    ports::{ThresholdFilters, ThresholdRepository},
    types::{PeriodType, ThresholdState},
};

/// `true` when a breach scoped to `period` lapses on `date`.
pub fn is_reset_day(period: PeriodType, date: NaiveDate) -> bool {
    match period {
        PeriodType::OneDay => true,
        PeriodType::OneWeek => date.weekday() == Weekday::Mon,
        PeriodType::OneMonth => date.day() == 1,
    }
}

#[derive(Clone)]
pub struct ThresholdResetter {
    repository: Arc<dyn ThresholdRepository>,
    metrics: Option<Arc<AppMetrics>>,
}

impl ThresholdResetter {
    pub fn new(repository: Arc<dyn ThresholdRepository>) -> Self {
        Self {
            repository,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Reset against today's local date.
    pub async fn reset(&self) -> Result<Vec<Threshold>, ThresholdError> {
        self.reset_on(Local::now().date_naive()).await
    }

    /// Re-enable every BREACHED threshold whose period boundary is `date`.
    /// Returns the re-enabled thresholds; ineligible ones are left untouched.
    pub async fn reset_on(&self, date: NaiveDate) -> Result<Vec<Threshold>, ThresholdError> {
        let breached = self
            .repository
            .find_by_filters(&ThresholdFilters::with_state(ThresholdState::Breached))
            .await?;

        let mut writes = JoinSet::new();
        for threshold in breached {
            // the filter is advisory for the state; re-check it here
            if threshold.threshold_state() != ThresholdState::Breached {
                continue;
            }
            let Some(period) = threshold.period_type() else {
                continue;
            };
            if !is_reset_day(period, date) {
                continue;
            }

            let repository = Arc::clone(&self.repository);
            writes.spawn(async move {
                let patch = ThresholdUpdate::state(ThresholdState::Enabled);
                // validate locally before writing, the repository re-applies it
                threshold.update(&patch)?;
                repository.update(threshold.id(), &patch).await
            });
        }

        // every write runs to completion; the first failure is returned after
        let mut reset = Vec::new();
        let mut first_error = None;
        while let Some(joined) = writes.join_next().await {
            match joined.map_err(|err| ThresholdError::storage(err.to_string())) {
                Ok(Ok(Some(threshold))) => reset.push(threshold),
                Ok(Ok(None)) => {}
                Ok(Err(err)) | Err(err) => {
                    tracing::error!("Failed to re-arm threshold: {}", err);
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.thresholds_reset_total.inc_by(reset.len() as f64);
        }
        tracing::info!(date = %date, reset = reset.len(), "Breached thresholds re-armed");

        match first_error {
            Some(err) => Err(err),
            None => Ok(reset),
        }
    }
}
