//! Change-detection monitor.
//!
//! Polls the repository for ENABLED thresholds on a fixed interval and
//! republishes the full set through the [`ChangeNotifier`] whenever its id
//! membership differs from the last published snapshot.
//!
//! The loop runs as one background task. Each tick is awaited inside the
//! loop and missed ticks are delayed, so at most one tick is ever in flight.
//! Tick failures are logged and the loop carries on. The notifier owns
//! reconnection, so a transport that is down at start or drops later is
//! retried by the next publication.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::metrics::AppMetrics;
use crate::thresholds::{
    error::{MonitorError, NotifyError},
    model::Threshold,
    ports::{ChangeNotifier, ThresholdFilters, ThresholdRepository},
    types::{ThresholdId, ThresholdState},
};

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Ids of the last published active set. Owned by the polling task only.
#[derive(Debug, Default)]
pub struct Snapshot {
    ids: HashSet<ThresholdId>,
}

impl Snapshot {
    /// Set comparison: order of `current` is irrelevant.
    pub fn differs_from(&self, current: &[Threshold]) -> bool {
        let current_ids: HashSet<&ThresholdId> = current.iter().map(Threshold::id).collect();
        current_ids.len() != self.ids.len() || current_ids.iter().any(|id| !self.ids.contains(*id))
    }

    fn replace(&mut self, current: &[Threshold]) {
        self.ids = current.iter().map(|t| t.id().clone()).collect();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ThresholdMonitor {
    repository: Arc<dyn ThresholdRepository>,
    notifier: Arc<dyn ChangeNotifier>,
    interval: Duration,
    metrics: Option<Arc<AppMetrics>>,
    running: Mutex<Option<Running>>,
}

impl ThresholdMonitor {
    pub fn new(
        repository: Arc<dyn ThresholdRepository>,
        notifier: Arc<dyn ChangeNotifier>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            notifier,
            interval,
            metrics: None,
            running: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Connect the notifier and spawn the polling loop. No-op when running.
    ///
    /// A failed connect is logged and the loop starts anyway.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return;
        }

        if let Err(err) = self.notifier.connect().await {
            tracing::warn!("Change notifier unavailable, retrying on publish: {}", err);
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_polling(
            Arc::clone(&self.repository),
            Arc::clone(&self.notifier),
            self.interval,
            self.metrics.clone(),
            cancel.clone(),
        ));

        *running = Some(Running { cancel, handle });
        tracing::info!(
            "Threshold monitor started (interval: {}ms)",
            self.interval.as_millis()
        );
    }

    /// Cancel the loop, wait for it to finish, then disconnect the notifier.
    /// No-op when not running.
    pub async fn stop(&self) -> Result<(), NotifyError> {
        let Some(Running { cancel, handle }) = self.running.lock().await.take() else {
            return Ok(());
        };

        cancel.cancel();
        if let Err(err) = handle.await {
            tracing::error!("Threshold monitor task ended abnormally: {}", err);
        }

        self.notifier.disconnect().await?;
        tracing::info!("Threshold monitor stopped cleanly");
        Ok(())
    }
}

async fn run_polling(
    repository: Arc<dyn ThresholdRepository>,
    notifier: Arc<dyn ChangeNotifier>,
    period: Duration,
    metrics: Option<Arc<AppMetrics>>,
    cancel: CancellationToken,
) {
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut snapshot = Snapshot::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = interval.tick() => {
                if let Some(m) = &metrics {
                    m.monitor_ticks_total.inc();
                }
                match poll_once(repository.as_ref(), notifier.as_ref(), &mut snapshot).await {
                    Ok(true) => {
                        if let Some(m) = &metrics {
                            m.change_notifications_total.inc();
                        }
                    }
                    Ok(false) => {}
                    Err(err) => {
                        if let Some(m) = &metrics {
                            m.monitor_tick_errors_total.inc();
                        }
                        tracing::error!("Threshold monitor tick failed: {}", err);
                    }
                }
            }
        }
    }
}

/// Execute a single poll cycle. Returns `true` when a new set was published.
///
/// The snapshot is only replaced after a successful publication, so a failed
/// publish is retried on the next tick.
pub async fn poll_once(
    repository: &dyn ThresholdRepository,
    notifier: &dyn ChangeNotifier,
    snapshot: &mut Snapshot,
) -> Result<bool, MonitorError> {
    let active = repository
        .find_by_filters(&ThresholdFilters::with_state(ThresholdState::Enabled))
        .await?;

    if !snapshot.differs_from(&active) {
        return Ok(false);
    }

    notifier.notify_change(&active).await?;
    snapshot.replace(&active);
    tracing::debug!("Published {} active thresholds", active.len());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::model::NewThreshold;
    use crate::thresholds::testing::{RecordingChangeNotifier, ScriptedRepository};
    use crate::thresholds::types::{ThresholdType, UtilityType};

    fn enabled(id: &str) -> Threshold {
        Threshold::create(
            ThresholdId::parse(id).unwrap(),
            NewThreshold::new(
                format!("name-{}", id),
                UtilityType::Water,
                10.0,
                ThresholdType::Actual,
            ),
        )
        .unwrap()
    }

    // ---- poll_once ----

    #[tokio::test]
    async fn first_poll_with_active_thresholds_publishes() {
        let repo = ScriptedRepository::default();
        repo.push_ok(vec![enabled("a"), enabled("b")]);
        let notifier = RecordingChangeNotifier::default();
        let mut snapshot = Snapshot::default();

        let published = poll_once(&repo, &notifier, &mut snapshot).await.unwrap();

        assert!(published);
        assert_eq!(notifier.published(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn first_poll_with_no_active_thresholds_is_silent() {
        let repo = ScriptedRepository::default();
        repo.push_ok(vec![]);
        let notifier = RecordingChangeNotifier::default();
        let mut snapshot = Snapshot::default();

        assert!(!poll_once(&repo, &notifier, &mut snapshot).await.unwrap());
        assert!(notifier.published().is_empty());
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn reordered_same_set_is_not_republished() {
        let repo = ScriptedRepository::default();
        repo.push_ok(vec![enabled("a"), enabled("b")]);
        repo.push_ok(vec![enabled("b"), enabled("a")]);
        let notifier = RecordingChangeNotifier::default();
        let mut snapshot = Snapshot::default();

        poll_once(&repo, &notifier, &mut snapshot).await.unwrap();
        let again = poll_once(&repo, &notifier, &mut snapshot).await.unwrap();

        assert!(!again);
        assert_eq!(notifier.published().len(), 1);
    }

    #[tokio::test]
    async fn added_or_removed_id_is_republished() {
        let repo = ScriptedRepository::default();
        repo.push_ok(vec![enabled("a")]);
        repo.push_ok(vec![enabled("a"), enabled("b")]);
        repo.push_ok(vec![enabled("b")]);
        repo.push_ok(vec![enabled("c")]);
        let notifier = RecordingChangeNotifier::default();
        let mut snapshot = Snapshot::default();

        for _ in 0..4 {
            assert!(poll_once(&repo, &notifier, &mut snapshot).await.unwrap());
        }
        assert_eq!(notifier.published().len(), 4);
        assert_eq!(notifier.published()[3], vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn repository_failure_is_reported_and_snapshot_kept() {
        let repo = ScriptedRepository::default();
        repo.push_ok(vec![enabled("a")]);
        repo.push_err();
        let notifier = RecordingChangeNotifier::default();
        let mut snapshot = Snapshot::default();

        poll_once(&repo, &notifier, &mut snapshot).await.unwrap();
        let err = poll_once(&repo, &notifier, &mut snapshot).await.unwrap_err();

        assert!(matches!(err, MonitorError::Repository(_)));
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn failed_publish_is_retried_next_poll() {
        let repo = ScriptedRepository::default();
        repo.push_ok(vec![enabled("a")]);
        let notifier = RecordingChangeNotifier::failing_next(1);
        let mut snapshot = Snapshot::default();

        let err = poll_once(&repo, &notifier, &mut snapshot).await.unwrap_err();
        assert!(matches!(err, MonitorError::Notify(_)));
        assert!(snapshot.is_empty());

        assert!(poll_once(&repo, &notifier, &mut snapshot).await.unwrap());
        assert_eq!(notifier.published().len(), 1);
    }

    // ---- start / stop ----

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_and_stop_disconnects() {
        let repo = Arc::new(ScriptedRepository::default());
        repo.push_ok(vec![enabled("a")]);
        let notifier = Arc::new(RecordingChangeNotifier::default());
        let monitor =
            ThresholdMonitor::new(repo.clone(), notifier.clone(), Duration::from_millis(100));

        monitor.start().await;
        monitor.start().await;
        assert_eq!(notifier.connects(), 1);
        assert!(monitor.is_running().await);

        time::sleep(Duration::from_millis(350)).await;
        monitor.stop().await.unwrap();

        assert_eq!(notifier.disconnects(), 1);
        assert_eq!(notifier.published().len(), 1);
        assert!(!monitor.is_running().await);
    }

    #[tokio::test]
    async fn stop_when_not_running_is_a_no_op() {
        let notifier = Arc::new(RecordingChangeNotifier::default());
        let monitor = ThresholdMonitor::new(
            Arc::new(ScriptedRepository::default()),
            notifier.clone(),
            DEFAULT_POLL_INTERVAL,
        );

        monitor.stop().await.unwrap();
        assert_eq!(notifier.disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_failing_ticks() {
        let repo = Arc::new(ScriptedRepository::default());
        repo.push_err();
        repo.push_err();
        repo.push_ok(vec![enabled("a")]);
        let notifier = Arc::new(RecordingChangeNotifier::default());
        let metrics = Arc::new(AppMetrics::new().unwrap());
        let monitor =
            ThresholdMonitor::new(repo.clone(), notifier.clone(), Duration::from_millis(100))
                .with_metrics(metrics.clone());

        monitor.start().await;
        time::sleep(Duration::from_millis(450)).await;
        monitor.stop().await.unwrap();

        assert_eq!(notifier.published().len(), 1);
        assert!((metrics.monitor_tick_errors_total.get() - 2.0).abs() < f64::EPSILON);
        assert!((metrics.change_notifications_total.get() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_can_be_restarted_after_stop() {
        let repo = Arc::new(ScriptedRepository::default());
        let notifier = Arc::new(RecordingChangeNotifier::default());
        let monitor =
            ThresholdMonitor::new(repo.clone(), notifier.clone(), Duration::from_millis(100));

        monitor.start().await;
        monitor.stop().await.unwrap();
        monitor.start().await;
        monitor.stop().await.unwrap();

        assert_eq!(notifier.connects(), 2);
        assert_eq!(notifier.disconnects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_notifier_does_not_prevent_start() {
        let repo = Arc::new(ScriptedRepository::default());
        repo.push_ok(vec![enabled("a")]);
        let notifier = Arc::new(RecordingChangeNotifier::refusing_connect());
        let monitor =
            ThresholdMonitor::new(repo.clone(), notifier.clone(), Duration::from_millis(100));

        monitor.start().await;
        assert!(monitor.is_running().await);
        time::sleep(Duration::from_millis(250)).await;
        monitor.stop().await.unwrap();

        assert_eq!(notifier.connects(), 1);
        assert_eq!(notifier.published().len(), 1);
    }
}
