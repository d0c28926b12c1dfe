//! SQLite implementation of [`ThresholdRepository`].
//!
//! Categorical columns hold the wire names (`ELECTRICITY`, `ONE_WEEK`, ...)
//! and every row is rebuilt through the validating factory, so a row that
//! violates an invariant surfaces as a storage error instead of leaking out.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::thresholds::{
    error::ThresholdError,
    model::{NewThreshold, Threshold, ThresholdUpdate},
    ports::{ThresholdFilters, ThresholdRepository},
    types::ThresholdId,
};

const COLUMNS: &str =
    "id, name, utility_type, threshold_type, value, threshold_state, period_type";

const MAX_UPDATE_ATTEMPTS: usize = 5;

pub struct SqliteThresholdRepository {
    pool: SqlitePool,
}

impl SqliteThresholdRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn from_row(row: &SqliteRow) -> Result<Threshold, ThresholdError> {
    let id: String = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    let utility_type: String = row.try_get("utility_type")?;
    let threshold_type: String = row.try_get("threshold_type")?;
    let value: f64 = row.try_get("value")?;
    let threshold_state: String = row.try_get("threshold_state")?;
    let period_type: Option<String> = row.try_get("period_type")?;

    let attrs = NewThreshold {
        name,
        utility_type: utility_type.parse()?,
        value,
        threshold_type: threshold_type.parse()?,
        threshold_state: Some(threshold_state.parse()?),
        period_type: period_type.map(|p| p.parse()).transpose()?,
    };

    Threshold::create(ThresholdId::parse(&id)?, attrs).map_err(|err| {
        ThresholdError::storage(format!("corrupt threshold row {}: {}", id, err))
    })
}

/// Map a constraint failure to `AlreadyExists`, naming the clashing column.
fn write_error(err: sqlx::Error, threshold: &Threshold) -> ThresholdError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return if db_err.message().contains("thresholds.name") {
                ThresholdError::already_exists(threshold.name().as_str())
            } else {
                ThresholdError::already_exists(threshold.id().as_str())
            };
        }
    }
    err.into()
}

#[async_trait]
impl ThresholdRepository for SqliteThresholdRepository {
    async fn find_by_id(&self, id: &ThresholdId) -> Result<Option<Threshold>, ThresholdError> {
        let sql = format!("SELECT {} FROM thresholds WHERE id = ?", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn find_all(&self) -> Result<Vec<Threshold>, ThresholdError> {
        let sql = format!("SELECT {} FROM thresholds ORDER BY name ASC", COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(from_row).collect()
    }

    async fn find_by_filters(
        &self,
        filters: &ThresholdFilters,
    ) -> Result<Vec<Threshold>, ThresholdError> {
        // WHERE 1=1 plus one condition per present filter; binds follow the
        // same order.
        let mut conditions = vec!["1=1"];
        let mut binds: Vec<String> = Vec::new();

        if let Some(name) = &filters.name {
            conditions.push("name = ?");
            binds.push(name.clone());
        }
        if let Some(utility) = filters.utility_type {
            conditions.push("utility_type = ?");
            binds.push(utility.as_str().to_string());
        }
        if let Some(period) = filters.period_type {
            conditions.push("period_type = ?");
            binds.push(period.as_str().to_string());
        }
        if let Some(ttype) = filters.threshold_type {
            conditions.push("threshold_type = ?");
            binds.push(ttype.as_str().to_string());
        }
        if let Some(state) = filters.state {
            conditions.push("threshold_state = ?");
            binds.push(state.as_str().to_string());
        }

        let sql = format!(
            "SELECT {} FROM thresholds WHERE {} ORDER BY name ASC",
            COLUMNS,
            conditions.join(" AND ")
        );

        let rows = {
            let mut q = sqlx::query(&sql);
            for value in &binds {
                q = q.bind(value);
            }
            q.fetch_all(&self.pool).await?
        };
        rows.iter().map(from_row).collect()
    }

    async fn save(&self, threshold: Threshold) -> Result<Threshold, ThresholdError> {
        sqlx::query(
            "INSERT INTO thresholds
             (id, name, utility_type, threshold_type, value, threshold_state, period_type)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(threshold.id().as_str())
        .bind(threshold.name().as_str())
        .bind(threshold.utility_type().as_str())
        .bind(threshold.threshold_type().as_str())
        .bind(threshold.value().get())
        .bind(threshold.threshold_state().as_str())
        .bind(threshold.period_type().map(|p| p.as_str()))
        .execute(&self.pool)
        .await
        .map_err(|err| write_error(err, &threshold))?;

        Ok(threshold)
    }

    /// Validate the patch against the stored row, then write it with a
    /// compare-and-swap `UPDATE` keyed on the row as read. A concurrent
    /// writer makes the swap miss and the read is retried.
    async fn update(
        &self,
        id: &ThresholdId,
        patch: &ThresholdUpdate,
    ) -> Result<Option<Threshold>, ThresholdError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let Some(current) = self.find_by_id(id).await? else {
                return Ok(None);
            };
            let updated = current.update(patch)?;

            let result = sqlx::query(
                "UPDATE thresholds
                 SET name = ?, utility_type = ?, threshold_type = ?, value = ?,
                     threshold_state = ?, period_type = ?
                 WHERE id = ? AND name = ? AND utility_type = ? AND threshold_type = ?
                   AND value = ? AND threshold_state = ? AND period_type IS ?",
            )
            .bind(updated.name().as_str())
            .bind(updated.utility_type().as_str())
            .bind(updated.threshold_type().as_str())
            .bind(updated.value().get())
            .bind(updated.threshold_state().as_str())
            .bind(updated.period_type().map(|p| p.as_str()))
            .bind(id.as_str())
            .bind(current.name().as_str())
            .bind(current.utility_type().as_str())
            .bind(current.threshold_type().as_str())
            .bind(current.value().get())
            .bind(current.threshold_state().as_str())
            .bind(current.period_type().map(|p| p.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|err| write_error(err, &updated))?;

            if result.rows_affected() == 1 {
                return Ok(Some(updated));
            }
            tracing::debug!(threshold_id = %id, "Threshold changed during update, retrying");
        }

        Err(ThresholdError::storage(format!(
            "threshold {} kept changing during update",
            id
        )))
    }

    async fn delete(&self, id: &ThresholdId) -> Result<(), ThresholdError> {
        let result = sqlx::query("DELETE FROM thresholds WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ThresholdError::not_found(id));
        }
        Ok(())
    }
}
