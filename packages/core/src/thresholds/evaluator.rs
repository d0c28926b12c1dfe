//! Consumption evaluation engine.
//!
//! Decides which enabled thresholds a consumption sample breaches:
//! - ACTUAL thresholds are compared in real time and never written back
//! - HISTORICAL / FORECAST thresholds go through `Threshold::check` and a
//!   BREACHED result is persisted until the reset job re-arms it
//!
//! Breaches of one sample are reported to the optional [`BreachNotifier`]
//! together with the sample that caused them.

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinSet;

use crate::metrics::AppMetrics;
use crate::thresholds::{
    error::ThresholdError,
    model::{Threshold, ThresholdUpdate},
    ports::{BreachNotifier, ConsumptionContext, ThresholdFilters, ThresholdRepository},
    types::{PeriodType, ThresholdId, ThresholdState, ThresholdType, UtilityType},
};

/// A single metered value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Reading {
    pub value: f64,
}

/// Latest readings per utility; absent utilities are skipped.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UtilityReadings {
    #[serde(default)]
    pub electricity: Option<Reading>,
    #[serde(default)]
    pub water: Option<Reading>,
    #[serde(default)]
    pub gas: Option<Reading>,
}

impl UtilityReadings {
    fn present(&self) -> impl Iterator<Item = (UtilityType, Reading)> + '_ {
        UtilityType::ALL.into_iter().filter_map(move |utility| {
            let reading = match utility {
                UtilityType::Electricity => self.electricity,
                UtilityType::Water => self.water,
                UtilityType::Gas => self.gas,
            };
            reading.map(|r| (utility, r))
        })
    }
}

/// Category shared by every reading of a `process_readings` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
}

/// One forecasted aggregate for a period.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastAggregation {
    pub period_type: PeriodType,
    pub value: f64,
}

/// Central evaluation engine. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct ConsumptionEvaluator {
    repository: Arc<dyn ThresholdRepository>,
    notifier: Option<Arc<dyn BreachNotifier>>,
    metrics: Option<Arc<AppMetrics>>,
}

impl ConsumptionEvaluator {
    pub fn new(repository: Arc<dyn ThresholdRepository>) -> Self {
        Self {
            repository,
            notifier: None,
            metrics: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn BreachNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Evaluate one sample and return the thresholds it breached.
    ///
    /// Repository failures propagate to the caller.
    pub async fn evaluate(
        &self,
        sample: ConsumptionContext,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        if !sample.value.is_finite() {
            return Err(ThresholdError::InvalidConsumption { value: sample.value });
        }

        let active = self.fetch_active(&sample).await?;

        let mut breaches = Vec::new();
        let mut to_persist = Vec::new();
        for threshold in active {
            match threshold.threshold_type() {
                ThresholdType::Actual => {
                    if threshold.is_breached_by(sample.value) {
                        breaches.push(threshold);
                    }
                }
                ThresholdType::Historical | ThresholdType::Forecast => {
                    let checked = threshold.check(sample.value);
                    if checked.threshold_state() == ThresholdState::Breached {
                        to_persist.push(checked.id().clone());
                        breaches.push(checked);
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.evaluations_total.inc();
            metrics.breaches_total.inc_by(breaches.len() as f64);
        }

        if breaches.is_empty() {
            return Ok(breaches);
        }

        tracing::info!(
            utility = %sample.utility_type,
            threshold_type = %sample.threshold_type,
            value = sample.value,
            breached = breaches.len(),
            "Consumption breached thresholds"
        );

        if let Err((err, unsaved)) = self.persist_breaches(to_persist).await {
            // Later evaluations skip BREACHED rows; alert the committed ones now.
            let committed: Vec<Threshold> = breaches
                .into_iter()
                .filter(|t| !unsaved.contains(t.id()))
                .collect();
            self.notify(&sample, &committed).await;
            return Err(err);
        }
        self.notify(&sample, &breaches).await;

        Ok(breaches)
    }

    /// Evaluate every sample concurrently and concatenate the breaches.
    ///
    /// A failing sample is logged and skipped; it never aborts the batch.
    pub async fn evaluate_batch(&self, samples: Vec<ConsumptionContext>) -> Vec<Threshold> {
        let mut tasks = JoinSet::new();
        for sample in samples {
            let engine = self.clone();
            tasks.spawn(async move { (sample, engine.evaluate(sample).await) });
        }

        let mut breaches = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(found))) => breaches.extend(found),
                Ok((sample, Err(err))) => {
                    self.record_failure();
                    tracing::error!(
                        utility = %sample.utility_type,
                        threshold_type = %sample.threshold_type,
                        "Evaluation failed: {}",
                        err
                    );
                }
                Err(err) => {
                    self.record_failure();
                    tracing::error!("Evaluation task aborted: {}", err);
                }
            }
        }

        breaches
    }

    /// Fan out one evaluation per present utility reading, sharing `context`.
    pub async fn process_readings(
        &self,
        readings: &UtilityReadings,
        context: EvaluationContext,
    ) -> Vec<Threshold> {
        let samples = readings
            .present()
            .map(|(utility_type, reading)| ConsumptionContext {
                utility_type,
                threshold_type: context.threshold_type,
                period_type: context.period_type,
                value: reading.value,
            })
            .collect();

        self.evaluate_batch(samples).await
    }

    /// Evaluate forecast aggregations against FORECAST thresholds.
    ///
    /// Unlike batch evaluation, the first failure is returned.
    pub async fn evaluate_forecast(
        &self,
        utility_type: UtilityType,
        aggregations: &[ForecastAggregation],
    ) -> Result<Vec<Threshold>, ThresholdError> {
        let mut tasks = JoinSet::new();
        for aggregation in aggregations {
            let engine = self.clone();
            let sample = ConsumptionContext {
                utility_type,
                threshold_type: ThresholdType::Forecast,
                period_type: Some(aggregation.period_type),
                value: aggregation.value,
            };
            tasks.spawn(async move { engine.evaluate(sample).await });
        }

        let mut breaches = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let found = joined.map_err(|err| ThresholdError::storage(err.to_string()))??;
            breaches.extend(found);
        }
        Ok(breaches)
    }

    /// Enabled thresholds matching the sample. ACTUAL thresholds are never
    /// period-scoped, so the period is dropped from their filter.
    async fn fetch_active(
        &self,
        sample: &ConsumptionContext,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        let period_type = match sample.threshold_type {
            ThresholdType::Actual => None,
            _ => sample.period_type,
        };
        let filters = ThresholdFilters {
            utility_type: Some(sample.utility_type),
            threshold_type: Some(sample.threshold_type),
            period_type,
            ..ThresholdFilters::default()
        };

        let found = self.repository.find_by_filters(&filters).await?;
        Ok(found.into_iter().filter(Threshold::is_enabled).collect())
    }

    /// One concurrent write per breached period threshold.
    ///
    /// Every write runs to completion. On failure the first error is returned
    /// with the ids that were not written.
    async fn persist_breaches(
        &self,
        ids: Vec<ThresholdId>,
    ) -> Result<(), (ThresholdError, Vec<ThresholdId>)> {
        let mut unsaved = ids.clone();
        let mut writes = JoinSet::new();
        for id in ids {
            let repository = Arc::clone(&self.repository);
            writes.spawn(async move {
                let patch = ThresholdUpdate::state(ThresholdState::Breached);
                let result = repository.update(&id, &patch).await;
                if let Ok(None) = result {
                    tracing::warn!(threshold_id = %id, "Breached threshold vanished before write");
                }
                (id, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((id, Ok(_))) => unsaved.retain(|pending| pending != &id),
                Ok((id, Err(err))) => {
                    tracing::error!(threshold_id = %id, "Failed to persist breach: {}", err);
                    first_error.get_or_insert(err);
                }
                Err(err) => {
                    first_error.get_or_insert(ThresholdError::storage(err.to_string()));
                }
            }
        }

        match first_error {
            Some(err) => Err((err, unsaved)),
            None => Ok(()),
        }
    }

    async fn notify(&self, sample: &ConsumptionContext, breaches: &[Threshold]) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if breaches.is_empty() {
            return;
        }
        if let Err(err) = notifier.notify_breach(sample, breaches).await {
            tracing::error!("Breach notification failed: {}", err);
        }
    }

    fn record_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.evaluation_failures_total.inc();
        }
    }
}
