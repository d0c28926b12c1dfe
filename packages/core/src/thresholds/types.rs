//! Categorical fields and value objects of the threshold model.
//!
//! Every categorical field is a closed enum so an unknown category can never
//! reach the engine. Wire names are `SCREAMING_SNAKE_CASE` both in JSON and in
//! the SQLite columns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::thresholds::error::ThresholdError;

/// The utility a threshold (or a consumption sample) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UtilityType {
    Electricity,
    Water,
    Gas,
}

/// How the compared value is obtained; decides period scoping and whether a
/// breach is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdType {
    Actual,
    Historical,
    Forecast,
}

/// Calendar granularity a period-scoped threshold is reset against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    OneDay,
    OneWeek,
    OneMonth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdState {
    Enabled,
    Disabled,
    Breached,
}

impl UtilityType {
    pub const ALL: [UtilityType; 3] = [Self::Electricity, Self::Water, Self::Gas];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "ELECTRICITY",
            Self::Water => "WATER",
            Self::Gas => "GAS",
        }
    }
}

impl ThresholdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Actual => "ACTUAL",
            Self::Historical => "HISTORICAL",
            Self::Forecast => "FORECAST",
        }
    }

    /// HISTORICAL and FORECAST thresholds must carry a period; ACTUAL must not.
    pub fn requires_period(&self) -> bool {
        !matches!(self, Self::Actual)
    }
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "ONE_DAY",
            Self::OneWeek => "ONE_WEEK",
            Self::OneMonth => "ONE_MONTH",
        }
    }
}

impl ThresholdState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
            Self::Breached => "BREACHED",
        }
    }
}

macro_rules! impl_wire_name {
    ($ty:ty, $label:literal, [$($variant:ident),+]) => {
        impl FromStr for $ty {
            type Err = ThresholdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s == <$ty>::$variant.as_str() {
                        return Ok(<$ty>::$variant);
                    }
                )+
                Err(ThresholdError::invalid_category($label, s))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_wire_name!(UtilityType, "utility type", [Electricity, Water, Gas]);
impl_wire_name!(ThresholdType, "threshold type", [Actual, Historical, Forecast]);
impl_wire_name!(PeriodType, "period type", [OneDay, OneWeek, OneMonth]);
impl_wire_name!(ThresholdState, "threshold state", [Enabled, Disabled, Breached]);

/// Opaque threshold identifier. Trimmed and never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ThresholdId(String);

impl ThresholdId {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, ThresholdError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ThresholdError::InvalidId {
                id: raw.as_ref().to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThresholdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human-readable label, unique across the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ThresholdName(String);

impl ThresholdName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ThresholdError> {
        let name = raw.into();
        if name.trim().is_empty() {
            return Err(ThresholdError::BlankName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThresholdName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strictly positive, finite consumption limit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ThresholdValue(f64);

impl ThresholdValue {
    pub fn new(value: f64) -> Result<Self, ThresholdError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ThresholdError::InvalidValue { value });
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ThresholdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
