//! The `Threshold` entity and its state machine.
//!
//! A `Threshold` is immutable: `update` and `check` return new values and
//! every constructed value has passed the full invariant set.

use serde::{Deserialize, Deserializer, Serialize};

use crate::thresholds::{
    error::ThresholdError,
    types::{
        PeriodType, ThresholdId, ThresholdName, ThresholdState, ThresholdType,
        ThresholdValue, UtilityType,
    },
};

/// A consumption limit for one utility.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    id: ThresholdId,
    name: ThresholdName,
    utility_type: UtilityType,
    threshold_type: ThresholdType,
    value: ThresholdValue,
    threshold_state: ThresholdState,
    #[serde(skip_serializing_if = "Option::is_none")]
    period_type: Option<PeriodType>,
}

/// Raw attributes for the creation factory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewThreshold {
    pub name: String,
    pub utility_type: UtilityType,
    pub value: f64,
    pub threshold_type: ThresholdType,
    #[serde(default)]
    pub threshold_state: Option<ThresholdState>,
    #[serde(default)]
    pub period_type: Option<PeriodType>,
}

/// Partial attributes for `Threshold::update`. `None` keeps the current value.
///
/// `period_type` is doubly optional: `Some(None)` clears the period, which is
/// what switching a threshold to ACTUAL requires.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub utility_type: Option<UtilityType>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub threshold_type: Option<ThresholdType>,
    #[serde(default)]
    pub threshold_state: Option<ThresholdState>,
    #[serde(default, deserialize_with = "present_or_null")]
    pub period_type: Option<Option<PeriodType>>,
}

fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ThresholdUpdate {
    /// Patch that only moves the threshold to `state`.
    pub fn state(state: ThresholdState) -> Self {
        Self {
            threshold_state: Some(state),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl NewThreshold {
    pub fn new(
        name: impl Into<String>,
        utility_type: UtilityType,
        value: f64,
        threshold_type: ThresholdType,
    ) -> Self {
        Self {
            name: name.into(),
            utility_type,
            value,
            threshold_type,
            threshold_state: None,
            period_type: None,
        }
    }

    pub fn with_period(mut self, period: PeriodType) -> Self {
        self.period_type = Some(period);
        self
    }

    pub fn with_state(mut self, state: ThresholdState) -> Self {
        self.threshold_state = Some(state);
        self
    }
}

impl Threshold {
    /// Validating factory. The state defaults to ENABLED.
    pub fn create(id: ThresholdId, attrs: NewThreshold) -> Result<Self, ThresholdError> {
        Self::validated(
            id,
            ThresholdName::parse(attrs.name)?,
            attrs.utility_type,
            ThresholdValue::new(attrs.value)?,
            attrs.threshold_type,
            attrs.threshold_state.unwrap_or(ThresholdState::Enabled),
            attrs.period_type,
        )
    }

    fn validated(
        id: ThresholdId,
        name: ThresholdName,
        utility_type: UtilityType,
        value: ThresholdValue,
        threshold_type: ThresholdType,
        threshold_state: ThresholdState,
        period_type: Option<PeriodType>,
    ) -> Result<Self, ThresholdError> {
        match (threshold_type.requires_period(), period_type) {
            (false, Some(period)) => {
                return Err(ThresholdError::ActualWithPeriod {
                    period: period.to_string(),
                })
            }
            (true, None) => {
                return Err(ThresholdError::MissingPeriod {
                    threshold_type: threshold_type.to_string(),
                })
            }
            _ => {}
        }

        Ok(Self {
            id,
            name,
            utility_type,
            threshold_type,
            value,
            threshold_state,
            period_type,
        })
    }

    /// Copy with the supplied fields overridden, re-validated as a whole.
    pub fn update(&self, patch: &ThresholdUpdate) -> Result<Self, ThresholdError> {
        let name = match &patch.name {
            Some(name) => ThresholdName::parse(name.clone())?,
            None => self.name.clone(),
        };
        let value = match patch.value {
            Some(value) => ThresholdValue::new(value)?,
            None => self.value,
        };

        Self::validated(
            self.id.clone(),
            name,
            patch.utility_type.unwrap_or(self.utility_type),
            value,
            patch.threshold_type.unwrap_or(self.threshold_type),
            patch.threshold_state.unwrap_or(self.threshold_state),
            patch.period_type.unwrap_or(self.period_type),
        )
    }

    /// State transition for a measured value.
    ///
    /// DISABLED never moves; a breach moves ENABLED to BREACHED; BREACHED
    /// stays BREACHED whatever the input.
    pub fn check(&self, measured: f64) -> Self {
        if self.threshold_state == ThresholdState::Disabled || !self.is_breached_by(measured) {
            return self.clone();
        }

        Self {
            threshold_state: ThresholdState::Breached,
            ..self.clone()
        }
    }

    /// Pure breach predicate, used for real-time ACTUAL evaluation.
    pub fn is_breached_by(&self, measured: f64) -> bool {
        measured > self.value.get()
    }

    pub fn id(&self) -> &ThresholdId {
        &self.id
    }

    pub fn name(&self) -> &ThresholdName {
        &self.name
    }

    pub fn utility_type(&self) -> UtilityType {
        self.utility_type
    }

    pub fn threshold_type(&self) -> ThresholdType {
        self.threshold_type
    }

    pub fn value(&self) -> ThresholdValue {
        self.value
    }

    pub fn threshold_state(&self) -> ThresholdState {
        self.threshold_state
    }

    pub fn period_type(&self) -> Option<PeriodType> {
        self.period_type
    }

    pub fn is_enabled(&self) -> bool {
        self.threshold_state == ThresholdState::Enabled
    }
}
