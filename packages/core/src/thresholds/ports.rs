//! Collaborator interfaces the threshold core depends on.
//!
//! Persistence, alert delivery, change publication and id generation live
//! behind these traits so the engine, monitor and reset logic can be driven
//! by in-memory doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::thresholds::{
    error::{NotifyError, ThresholdError},
    model::{Threshold, ThresholdUpdate},
    types::{PeriodType, ThresholdId, ThresholdState, ThresholdType, UtilityType},
};

/// Optional equality filters; `None` fields do not constrain the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdFilters {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub utility_type: Option<UtilityType>,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
    #[serde(default)]
    pub threshold_type: Option<ThresholdType>,
    #[serde(default)]
    pub state: Option<ThresholdState>,
}

impl ThresholdFilters {
    pub fn with_state(state: ThresholdState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, threshold: &Threshold) -> bool {
        self.name
            .as_deref()
            .map_or(true, |name| threshold.name().as_str() == name)
            && self
                .utility_type
                .map_or(true, |u| threshold.utility_type() == u)
            && self
                .period_type
                .map_or(true, |p| threshold.period_type() == Some(p))
            && self
                .threshold_type
                .map_or(true, |t| threshold.threshold_type() == t)
            && self.state.map_or(true, |s| threshold.threshold_state() == s)
    }
}

/// The sample context a breach event carries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionContext {
    pub utility_type: UtilityType,
    pub threshold_type: ThresholdType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_type: Option<PeriodType>,
    pub value: f64,
}

/// Durable owner of thresholds.
///
/// Implementations must surface uniqueness conflicts as
/// [`ThresholdError::AlreadyExists`] and deleting a missing id as
/// [`ThresholdError::NotFound`].
#[async_trait]
pub trait ThresholdRepository: Send + Sync {
    async fn find_by_id(&self, id: &ThresholdId) -> Result<Option<Threshold>, ThresholdError>;

    async fn find_all(&self) -> Result<Vec<Threshold>, ThresholdError>;

    async fn find_by_filters(
        &self,
        filters: &ThresholdFilters,
    ) -> Result<Vec<Threshold>, ThresholdError>;

    async fn save(&self, threshold: Threshold) -> Result<Threshold, ThresholdError>;

    /// Apply `patch` through [`Threshold::update`] and persist the result.
    /// Returns `Ok(None)` when no threshold has this id.
    async fn update(
        &self,
        id: &ThresholdId,
        patch: &ThresholdUpdate,
    ) -> Result<Option<Threshold>, ThresholdError>;

    async fn delete(&self, id: &ThresholdId) -> Result<(), ThresholdError>;
}

/// Receives the thresholds a single sample breached.
#[async_trait]
pub trait BreachNotifier: Send + Sync {
    async fn notify_breach(
        &self,
        consumption: &ConsumptionContext,
        breached: &[Threshold],
    ) -> Result<(), NotifyError>;
}

/// Publishes the active-threshold set to downstream consumers.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    async fn connect(&self) -> Result<(), NotifyError>;

    async fn disconnect(&self) -> Result<(), NotifyError>;

    async fn notify_change(&self, active: &[Threshold]) -> Result<(), NotifyError>;
}

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ThresholdId;
}
