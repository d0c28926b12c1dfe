//! In-process doubles for the threshold ports, shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::InMemoryThresholdStore;
use crate::thresholds::{
    error::{NotifyError, ThresholdError},
    model::{NewThreshold, Threshold, ThresholdUpdate},
    ports::{
        BreachNotifier, ChangeNotifier, ConsumptionContext, IdGenerator, ThresholdFilters,
        ThresholdRepository,
    },
    types::ThresholdId,
};

/// In-memory repository that records every write and filter query.
#[derive(Default)]
pub struct RecordingRepository {
    inner: InMemoryThresholdStore,
    updates: Mutex<Vec<(ThresholdId, ThresholdUpdate)>>,
    filters: Mutex<Vec<ThresholdFilters>>,
    rejected_updates: Mutex<Vec<ThresholdId>>,
}

impl RecordingRepository {
    /// Make every later `update` of `id` fail with a storage error.
    pub fn reject_updates_of(&self, id: &str) {
        let id = ThresholdId::parse(id).unwrap();
        self.rejected_updates.lock().unwrap().push(id);
    }

    pub fn updates(&self) -> Vec<(ThresholdId, ThresholdUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last_filters(&self) -> Option<ThresholdFilters> {
        self.filters.lock().unwrap().last().cloned()
    }

    pub fn filter_calls(&self) -> usize {
        self.filters.lock().unwrap().len()
    }

    pub async fn get(&self, id: &str) -> Threshold {
        self.inner
            .find_by_id(&ThresholdId::parse(id).unwrap())
            .await
            .unwrap()
            .expect("threshold should exist")
    }
}

pub async fn seed(repo: &RecordingRepository, id: &str, attrs: NewThreshold) -> Threshold {
    let threshold = Threshold::create(ThresholdId::parse(id).unwrap(), attrs).unwrap();
    repo.inner.save(threshold).await.unwrap()
}

#[async_trait]
impl ThresholdRepository for RecordingRepository {
    async fn find_by_id(&self, id: &ThresholdId) -> Result<Option<Threshold>, ThresholdError> {
        self.inner.find_by_id(id).await
    }

    async fn find_all(&self) -> Result<Vec<Threshold>, ThresholdError> {
        self.inner.find_all().await
    }

    async fn find_by_filters(
        &self,
        filters: &ThresholdFilters,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        self.filters.lock().unwrap().push(filters.clone());
        self.inner.find_by_filters(filters).await
    }

    async fn save(&self, threshold: Threshold) -> Result<Threshold, ThresholdError> {
        self.inner.save(threshold).await
    }

    async fn update(
        &self,
        id: &ThresholdId,
        patch: &ThresholdUpdate,
    ) -> Result<Option<Threshold>, ThresholdError> {
        self.updates.lock().unwrap().push((id.clone(), patch.clone()));
        if self.rejected_updates.lock().unwrap().contains(id) {
            return Err(ThresholdError::storage("write rejected"));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &ThresholdId) -> Result<(), ThresholdError> {
        self.inner.delete(id).await
    }
}

/// Repository whose every call fails with a storage error.
pub struct FailingRepository;

#[async_trait]
impl ThresholdRepository for FailingRepository {
    async fn find_by_id(&self, _id: &ThresholdId) -> Result<Option<Threshold>, ThresholdError> {
        Err(ThresholdError::storage("unavailable"))
    }

    async fn find_all(&self) -> Result<Vec<Threshold>, ThresholdError> {
        Err(ThresholdError::storage("unavailable"))
    }

    async fn find_by_filters(
        &self,
        _filters: &ThresholdFilters,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        Err(ThresholdError::storage("unavailable"))
    }

    async fn save(&self, _threshold: Threshold) -> Result<Threshold, ThresholdError> {
        Err(ThresholdError::storage("unavailable"))
    }

    async fn update(
        &self,
        _id: &ThresholdId,
        _patch: &ThresholdUpdate,
    ) -> Result<Option<Threshold>, ThresholdError> {
        Err(ThresholdError::storage("unavailable"))
    }

    async fn delete(&self, _id: &ThresholdId) -> Result<(), ThresholdError> {
        Err(ThresholdError::storage("unavailable"))
    }
}

/// Repository that answers `find_by_filters` from a queue of scripted results.
/// Once the queue is drained the last successful answer repeats.
#[derive(Default)]
pub struct ScriptedRepository {
    script: Mutex<VecDeque<Result<Vec<Threshold>, ThresholdError>>>,
    last: Mutex<Vec<Threshold>>,
}

impl ScriptedRepository {
    pub fn push_ok(&self, thresholds: Vec<Threshold>) {
        self.script.lock().unwrap().push_back(Ok(thresholds));
    }

    pub fn push_err(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(ThresholdError::storage("scripted failure")));
    }
}

#[async_trait]
impl ThresholdRepository for ScriptedRepository {
    async fn find_by_id(&self, _id: &ThresholdId) -> Result<Option<Threshold>, ThresholdError> {
        Ok(None)
    }

    async fn find_all(&self) -> Result<Vec<Threshold>, ThresholdError> {
        Ok(self.last.lock().unwrap().clone())
    }

    async fn find_by_filters(
        &self,
        _filters: &ThresholdFilters,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(thresholds)) => {
                *self.last.lock().unwrap() = thresholds.clone();
                Ok(thresholds)
            }
            Some(Err(err)) => Err(err),
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }

    async fn save(&self, threshold: Threshold) -> Result<Threshold, ThresholdError> {
        Ok(threshold)
    }

    async fn update(
        &self,
        _id: &ThresholdId,
        _patch: &ThresholdUpdate,
    ) -> Result<Option<Threshold>, ThresholdError> {
        Ok(None)
    }

    async fn delete(&self, _id: &ThresholdId) -> Result<(), ThresholdError> {
        Ok(())
    }
}

/// Records the sample and breached ids of every breach notification.
#[derive(Default)]
pub struct RecordingBreachNotifier {
    calls: Mutex<Vec<(ConsumptionContext, Vec<String>)>>,
    fail: bool,
}

impl RecordingBreachNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(ConsumptionContext, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BreachNotifier for RecordingBreachNotifier {
    async fn notify_breach(
        &self,
        consumption: &ConsumptionContext,
        breached: &[Threshold],
    ) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::delivery("alert service down"));
        }
        let ids = breached.iter().map(|t| t.id().to_string()).collect();
        self.calls.lock().unwrap().push((*consumption, ids));
        Ok(())
    }
}

/// Counts connects/disconnects and records every published id set.
#[derive(Default)]
pub struct RecordingChangeNotifier {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    published: Mutex<Vec<Vec<String>>>,
    failures_left: AtomicUsize,
    refuse_connect: bool,
}

impl RecordingChangeNotifier {
    /// Fail the next `n` publications.
    pub fn failing_next(n: usize) -> Self {
        let notifier = Self::default();
        notifier.failures_left.store(n, Ordering::SeqCst);
        notifier
    }

    /// Every `connect` fails; publications still go through.
    pub fn refusing_connect() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<Vec<String>> {
        self.published.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeNotifier for RecordingChangeNotifier {
    async fn connect(&self) -> Result<(), NotifyError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect {
            return Err(NotifyError::connection("monitoring service down"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), NotifyError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn notify_change(&self, active: &[Threshold]) -> Result<(), NotifyError> {
        let pending = self.failures_left.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_left.store(pending - 1, Ordering::SeqCst);
            return Err(NotifyError::NotConnected);
        }
        let ids = active.iter().map(|t| t.id().to_string()).collect();
        self.published.lock().unwrap().push(ids);
        Ok(())
    }
}

/// Deterministic ids `th-1`, `th-2`, ...
#[derive(Default)]
pub struct SequentialIds {
    next: AtomicUsize,
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> ThresholdId {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        ThresholdId::parse(format!("th-{}", n)).unwrap()
    }
}
