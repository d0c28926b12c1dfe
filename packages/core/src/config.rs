use std::env;
use std::time::Duration;

use crate::cli::Cli;
use crate::thresholds::monitor::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://thresholds.db";
pub const DEFAULT_ALERT_SERVICE_URI: &str = "http://alert-service:3004";
pub const DEFAULT_ALERT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_MONITORING_SERVICE_URI: &str = "ws://monitoring-service:3005";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub alert_service_uri: String,
    pub alert_timeout: Duration,
    pub monitoring_service_uri: String,
    pub monitoring_interval: Duration,
    /// Keep thresholds in process memory instead of SQLite.
    pub in_memory: bool,
}

impl Config {
    /// Every setting is optional; unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let port = number(&lookup, "PORT", DEFAULT_PORT)?;
        let alert_timeout_ms = number(&lookup, "ALERT_TIMEOUT_MS", DEFAULT_ALERT_TIMEOUT_MS)?;
        let monitoring_interval_ms = number(
            &lookup,
            "MONITORING_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL.as_millis() as u64,
        )?;
        if monitoring_interval_ms == 0 {
            return Err("MONITORING_INTERVAL_MS must be greater than 0".into());
        }

        Ok(Self {
            port,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into()),
            alert_service_uri: lookup("ALERT_SERVICE_URI")
                .unwrap_or_else(|| DEFAULT_ALERT_SERVICE_URI.into()),
            alert_timeout: Duration::from_millis(alert_timeout_ms),
            monitoring_service_uri: lookup("MONITORING_SERVICE_URI")
                .unwrap_or_else(|| DEFAULT_MONITORING_SERVICE_URI.into()),
            monitoring_interval: Duration::from_millis(monitoring_interval_ms),
            in_memory: false,
        })
    }

    /// CLI flags take precedence over the environment.
    pub fn with_cli(mut self, cli: &Cli) -> Result<Self, String> {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(ms) = cli.monitoring_interval_ms {
            if ms == 0 {
                return Err("--monitoring-interval-ms must be greater than 0".into());
            }
            self.monitoring_interval = Duration::from_millis(ms);
        }
        self.in_memory |= cli.in_memory;
        Ok(self)
    }
}

fn number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
