use thiserror::Error;

/// Unified application error.
///
/// Failures of the binary itself (config, storage bootstrap, listener);
/// domain operations report [`crate::thresholds::ThresholdError`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
