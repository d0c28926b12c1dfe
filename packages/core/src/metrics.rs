//! Prometheus metrics registry for the threshold service.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the evaluator, monitor, resetter and HTTP middleware.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Consumption samples evaluated (batch items included).
    pub evaluations_total: Counter,
    /// Thresholds reported as breached.
    pub breaches_total: Counter,
    /// Batch items whose evaluation failed and was skipped.
    pub evaluation_failures_total: Counter,
    /// Change-monitor ticks, successful or not.
    pub monitor_ticks_total: Counter,
    /// Change-monitor ticks that failed.
    pub monitor_tick_errors_total: Counter,
    /// Active threshold sets published to the monitoring service.
    pub change_notifications_total: Counter,
    /// Breached thresholds re-armed by the reset job.
    pub thresholds_reset_total: Counter,
    /// HTTP request count, labelled by method, path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Fails only on an invalid or
    /// duplicated metric name.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<Counter, prometheus::Error> {
            let counter = Counter::with_opts(Opts::new(name, help))?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let evaluations_total = counter(
            "utility_thresholds_evaluations_total",
            "Consumption samples evaluated",
        )?;
        let breaches_total = counter(
            "utility_thresholds_breaches_total",
            "Thresholds reported as breached",
        )?;
        let evaluation_failures_total = counter(
            "utility_thresholds_evaluation_failures_total",
            "Batch evaluations that failed",
        )?;
        let monitor_ticks_total = counter(
            "utility_thresholds_monitor_ticks_total",
            "Change monitor ticks",
        )?;
        let monitor_tick_errors_total = counter(
            "utility_thresholds_monitor_tick_errors_total",
            "Failed change monitor ticks",
        )?;
        let change_notifications_total = counter(
            "utility_thresholds_change_notifications_total",
            "Active threshold sets published",
        )?;
        let thresholds_reset_total = counter(
            "utility_thresholds_reset_total",
            "Breached thresholds re-armed by the reset job",
        )?;

        let http_requests_total = CounterVec::new(
            Opts::new(
                "utility_thresholds_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "utility_thresholds_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            evaluations_total,
            breaches_total,
            evaluation_failures_total,
            monitor_ticks_total,
            monitor_tick_errors_total,
            change_notifications_total,
            thresholds_reset_total,
            http_requests_total,
            http_request_duration,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_metrics_register_without_error() {
        let metrics = AppMetrics::new();
        assert!(metrics.is_ok(), "AppMetrics::new() failed: {:?}", metrics.err());
    }

    #[test]
    fn render_produces_non_empty_output_after_increment() {
        let metrics = AppMetrics::new().unwrap();
        metrics.evaluations_total.inc();
        let output = metrics.render().unwrap();
        assert!(output.contains("utility_thresholds_evaluations_total"));
    }

    #[test]
    fn counters_increment_correctly() {
        let metrics = AppMetrics::new().unwrap();
        metrics.breaches_total.inc_by(3.0);
        metrics.monitor_tick_errors_total.inc();
        assert!((metrics.breaches_total.get() - 3.0).abs() < f64::EPSILON);
        assert!((metrics.monitor_tick_errors_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_counter_is_rendered() {
        let metrics = AppMetrics::new().unwrap();
        metrics.evaluations_total.inc();
        metrics.breaches_total.inc();
        metrics.evaluation_failures_total.inc();
        metrics.monitor_ticks_total.inc();
        metrics.monitor_tick_errors_total.inc();
        metrics.change_notifications_total.inc();
        metrics.thresholds_reset_total.inc_by(2.0);
        metrics
            .http_requests_total
            .with_label_values(&["GET", "/thresholds", "200"])
            .inc();
        metrics.http_request_duration.observe(0.042);

        let body = metrics.render().unwrap();

        for name in [
            "utility_thresholds_evaluations_total",
            "utility_thresholds_breaches_total",
            "utility_thresholds_evaluation_failures_total",
            "utility_thresholds_monitor_ticks_total",
            "utility_thresholds_monitor_tick_errors_total",
            "utility_thresholds_change_notifications_total",
            "utility_thresholds_http_requests_total",
            "utility_thresholds_http_request_duration_seconds",
        ] {
            assert!(body.contains(name), "missing {name}");
        }
        assert!(body.contains("utility_thresholds_reset_total 2"));
    }

    #[test]
    fn http_requests_counter_vec_labels_work() {
        let metrics = AppMetrics::new().unwrap();
        metrics
            .http_requests_total
            .with_label_values(&["POST", "/thresholds", "201"])
            .inc();
        let val = metrics
            .http_requests_total
            .with_label_values(&["POST", "/thresholds", "201"])
            .get();
        assert!((val - 1.0).abs() < f64::EPSILON);
    }
}
