//! Threshold domain: model, evaluation engine, change monitor and reset logic.

pub mod error;
pub mod evaluator;
pub mod model;
pub mod monitor;
pub mod ports;
pub mod reset;
pub mod service;
pub mod types;

#[cfg(test)]
pub mod testing;


pub use error::{MonitorError, NotifyError, ThresholdError};
pub use evaluator::{
    ConsumptionEvaluator, EvaluationContext, ForecastAggregation, Reading, UtilityReadings,
};
pub use model::{NewThreshold, Threshold, ThresholdUpdate};
pub use monitor::ThresholdMonitor;
pub use ports::{
    BreachNotifier, ChangeNotifier, ConsumptionContext, IdGenerator, ThresholdFilters,
    ThresholdRepository,
};
pub use reset::ThresholdResetter;
pub use service::ThresholdService;
pub use types::{
    PeriodType, ThresholdId, ThresholdName, ThresholdState, ThresholdType, ThresholdValue,
    UtilityType,
};
