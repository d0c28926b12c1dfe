//! In-memory threshold store.
//!
//! `InMemoryThresholdStore` keeps thresholds in insertion order behind a
//! Tokio `RwLock` and enforces the same contract as the SQLite repository:
//! unique ids and names, `NotFound` on deleting a missing id. Used by the
//! test suites and by `--in-memory` runs.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::thresholds::{
    error::ThresholdError,
    model::{Threshold, ThresholdUpdate},
    ports::{ThresholdFilters, ThresholdRepository},
    types::ThresholdId,
};

#[derive(Debug, Default)]
pub struct InMemoryThresholdStore {
    data: RwLock<Vec<Threshold>>,
}

impl InMemoryThresholdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of thresholds currently held.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Remove all thresholds from the store.
    pub async fn clear(&self) {
        self.data.write().await.clear();
    }
}

fn name_taken(data: &[Threshold], candidate: &Threshold) -> bool {
    data.iter()
        .any(|t| t.id() != candidate.id() && t.name() == candidate.name())
}

#[async_trait]
impl ThresholdRepository for InMemoryThresholdStore {
    async fn find_by_id(&self, id: &ThresholdId) -> Result<Option<Threshold>, ThresholdError> {
        let data = self.data.read().await;
        Ok(data.iter().find(|t| t.id() == id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Threshold>, ThresholdError> {
        Ok(self.data.read().await.clone())
    }

    async fn find_by_filters(
        &self,
        filters: &ThresholdFilters,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        let data = self.data.read().await;
        Ok(data.iter().filter(|t| filters.matches(t)).cloned().collect())
    }

    async fn save(&self, threshold: Threshold) -> Result<Threshold, ThresholdError> {
        let mut data = self.data.write().await;
        if data.iter().any(|t| t.id() == threshold.id()) {
            return Err(ThresholdError::already_exists(threshold.id().as_str()));
        }
        if name_taken(&data, &threshold) {
            return Err(ThresholdError::already_exists(threshold.name().as_str()));
        }
        data.push(threshold.clone());
        Ok(threshold)
    }

    async fn update(
        &self,
        id: &ThresholdId,
        patch: &ThresholdUpdate,
    ) -> Result<Option<Threshold>, ThresholdError> {
        let mut data = self.data.write().await;
        let Some(pos) = data.iter().position(|t| t.id() == id) else {
            return Ok(None);
        };

        let updated = data[pos].update(patch)?;
        if name_taken(&data, &updated) {
            return Err(ThresholdError::already_exists(updated.name().as_str()));
        }
        data[pos] = updated.clone();
        Ok(Some(updated))
    }

    async fn delete(&self, id: &ThresholdId) -> Result<(), ThresholdError> {
        let mut data = self.data.write().await;
        let before = data.len();
        data.retain(|t| t.id() != id);
        if data.len() == before {
            return Err(ThresholdError::not_found(id));
        }
        Ok(())
    }
}
