//! Threshold management use-cases backing the CRUD routes.

use std::sync::Arc;

use crate::thresholds::{
    error::ThresholdError,
    model::{NewThreshold, Threshold, ThresholdUpdate},
    ports::{IdGenerator, ThresholdFilters, ThresholdRepository},
    types::ThresholdId,
};

#[derive(Clone)]
pub struct ThresholdService {
    repository: Arc<dyn ThresholdRepository>,
    ids: Arc<dyn IdGenerator>,
}

impl ThresholdService {
    pub fn new(repository: Arc<dyn ThresholdRepository>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { repository, ids }
    }

    /// Validate `attrs`, assign a fresh id and persist the threshold.
    pub async fn create(&self, attrs: NewThreshold) -> Result<Threshold, ThresholdError> {
        let threshold = Threshold::create(self.ids.next_id(), attrs)?;
        let saved = self.repository.save(threshold).await?;
        tracing::info!(threshold_id = %saved.id(), name = %saved.name(), "Threshold created");
        Ok(saved)
    }

    pub async fn get(&self, id: &str) -> Result<Threshold, ThresholdError> {
        let id = ThresholdId::parse(id)?;
        self.repository
            .find_by_id(&id)
            .await?
            .ok_or_else(|| ThresholdError::not_found(&id))
    }

    /// Every threshold when `filters` is empty, otherwise the matching subset.
    pub async fn list(&self, filters: &ThresholdFilters) -> Result<Vec<Threshold>, ThresholdError> {
        if filters.is_empty() {
            self.repository.find_all().await
        } else {
            self.repository.find_by_filters(filters).await
        }
    }

    pub async fn update(
        &self,
        id: &str,
        patch: &ThresholdUpdate,
    ) -> Result<Threshold, ThresholdError> {
        let id = ThresholdId::parse(id)?;
        let updated = self
            .repository
            .update(&id, patch)
            .await?
            .ok_or_else(|| ThresholdError::not_found(&id))?;
        tracing::info!(threshold_id = %id, "Threshold updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ThresholdError> {
        let id = ThresholdId::parse(id)?;
        self.repository.delete(&id).await?;
        tracing::info!(threshold_id = %id, "Threshold deleted");
        Ok(())
    }
}
