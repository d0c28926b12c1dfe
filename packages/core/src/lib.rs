// Library root: exposes internal modules for integration tests in `tests/`.
// Production entry point remains `src/main.rs`.

pub mod alerts;
pub mod api;
pub mod db;
pub mod error;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod thresholds;

// Binary-only concerns, public so integration tests can reach them.
pub mod cli;
pub mod config;
pub mod logging;
