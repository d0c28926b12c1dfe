//! Error types for threshold operations

use thiserror::Error;

/// Errors raised by the threshold model, its use-cases and repositories
#[derive(Error, Debug)]
pub enum ThresholdError {
    #[error("Invalid threshold value {value}: threshold value must be greater than 0")]
    InvalidValue { value: f64 },

    #[error("Invalid threshold name: threshold name must not be empty")]
    BlankName,

    #[error("Invalid threshold ID format: {id:?}")]
    InvalidId { id: String },

    #[error("Invalid {field}: {value}")]
    InvalidCategory { field: &'static str, value: String },

    #[error("ACTUAL threshold cannot have a period type (got {period})")]
    ActualWithPeriod { period: String },

    #[error("{threshold_type} threshold requires a period type")]
    MissingPeriod { threshold_type: String },

    #[error("Invalid consumption value {value}: must be a finite number")]
    InvalidConsumption { value: f64 },

    #[error("Threshold not found with id: {id}")]
    NotFound { id: String },

    #[error("Threshold already exists for key: {key}")]
    AlreadyExists { key: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl ThresholdError {
    pub fn invalid_category(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidCategory { field, value: value.into() }
    }

    pub fn not_found(id: impl ToString) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into() }
    }

    /// `true` for the invariant violations raised at construction/update time.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue { .. }
                | Self::BlankName
                | Self::InvalidId { .. }
                | Self::InvalidCategory { .. }
                | Self::ActualWithPeriod { .. }
                | Self::MissingPeriod { .. }
                | Self::InvalidConsumption { .. }
        )
    }
}

impl From<sqlx::Error> for ThresholdError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Errors from the outbound notification transports
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification transport not connected")]
    NotConnected,

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Delivery error: {message}")]
    Delivery { message: String },

    #[error("Payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NotifyError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery { message: message.into() }
    }
}

/// Failure of a single monitor tick. Logged by the monitor loop, never escalated.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Failed to load active thresholds: {0}")]
    Repository(#[from] ThresholdError),

    #[error("Failed to publish active thresholds: {0}")]
    Notify(#[from] NotifyError),
}
