//! Daily reset scheduler.
//!
//! Fires on the [`RESET_CRON`] schedule (local midnight), runs the reset
//! logic once and repeats until cancelled. A failed run is logged and the
//! loop waits for the next fire time; missed days are not caught up.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::thresholds::ThresholdResetter;

/// Every day at 00:00:00 (sec min hour dom month dow).
pub const RESET_CRON: &str = "0 0 0 * * *";

pub fn reset_schedule() -> Result<Schedule, cron::error::Error> {
    Schedule::from_str(RESET_CRON)
}

/// Run the reset job on `schedule` in local time until `cancel` fires.
pub async fn run_daily_reset(
    resetter: ThresholdResetter,
    schedule: Schedule,
    cancel: CancellationToken,
) {
    tracing::info!(cron = RESET_CRON, "Daily reset scheduler started");

    loop {
        let Some(delay) = next_delay(&schedule, &Local::now()) else {
            tracing::error!("Reset schedule has no upcoming fire time. Stopping reset scheduler.");
            break;
        };
        tracing::debug!("Next threshold reset in {}s", delay.as_secs());

        tokio::select! {
            _ = time::sleep(delay) => {
                reset_once(&resetter).await;
            }

            _ = cancel.cancelled() => {
                tracing::info!("Shutdown signal received. Stopping reset scheduler.");
                break;
            }
        }
    }

    tracing::info!("Daily reset scheduler stopped cleanly");
}

/// Execute a single reset run. Extracted for testability.
async fn reset_once(resetter: &ThresholdResetter) -> usize {
    match resetter.reset().await {
        Ok(reset) => {
            tracing::info!("Threshold reset complete: {} re-armed", reset.len());
            reset.len()
        }
        Err(err) => {
            tracing::error!("Threshold reset failed: {}", err);
            0
        }
    }
}

/// Time from `now` until the next fire time of `schedule`, in `now`'s zone.
pub fn next_delay<Tz: TimeZone>(schedule: &Schedule, now: &DateTime<Tz>) -> Option<Duration> {
    let next = schedule.after(now).next()?;
    (next - now.clone()).to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{FixedOffset, NaiveDate, Utc};

    use crate::thresholds::testing::{seed, FailingRepository, RecordingRepository};
    use crate::thresholds::{NewThreshold, PeriodType, ThresholdState, ThresholdType, UtilityType};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, s)
                .unwrap(),
        )
    }

    fn until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
        next_delay(&reset_schedule().unwrap(), now).unwrap()
    }

    #[test]
    fn reset_cron_parses() {
        assert!(reset_schedule().is_ok());
    }

    #[test]
    fn midnight_delay_from_mid_day() {
        assert_eq!(
            until_midnight(&utc(2024, 3, 5, 18, 0, 0)),
            Duration::from_secs(6 * 60 * 60)
        );
    }

    #[test]
    fn exactly_midnight_waits_a_full_day() {
        assert_eq!(
            until_midnight(&utc(2024, 3, 5, 0, 0, 0)),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn crosses_month_and_year_boundaries() {
        assert_eq!(
            until_midnight(&utc(2023, 12, 31, 23, 59, 30)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn uses_the_zone_of_now() {
        let offset = FixedOffset::east_opt(2 * 60 * 60).unwrap();
        // 21:00 UTC is 23:00 at +02:00
        let now = utc(2024, 3, 5, 21, 0, 0).with_timezone(&offset);
        assert_eq!(until_midnight(&now), Duration::from_secs(60 * 60));
    }

    #[tokio::test]
    async fn reset_once_counts_re_armed_thresholds() {
        let repo = Arc::new(RecordingRepository::default());
        seed(
            &repo,
            "daily",
            NewThreshold::new("daily", UtilityType::Water, 5.0, ThresholdType::Historical)
                .with_period(PeriodType::OneDay)
                .with_state(ThresholdState::Breached),
        )
        .await;

        let count = reset_once(&ThresholdResetter::new(repo.clone())).await;

        assert_eq!(count, 1);
        assert_eq!(repo.get("daily").await.threshold_state(), ThresholdState::Enabled);
    }

    #[tokio::test]
    async fn reset_once_swallows_repository_errors() {
        let count = reset_once(&ThresholdResetter::new(Arc::new(FailingRepository))).await;
        assert_eq!(count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_resets_after_midnight_and_stops_on_cancel() {
        let repo = Arc::new(RecordingRepository::default());
        seed(
            &repo,
            "daily",
            NewThreshold::new("daily", UtilityType::Gas, 5.0, ThresholdType::Forecast)
                .with_period(PeriodType::OneDay)
                .with_state(ThresholdState::Breached),
        )
        .await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_daily_reset(
            ThresholdResetter::new(repo.clone()),
            reset_schedule().unwrap(),
            cancel.clone(),
        ));

        time::sleep(Duration::from_secs(24 * 60 * 60 + 1)).await;
        assert_eq!(repo.get("daily").await.threshold_state(), ThresholdState::Enabled);

        cancel.cancel();
        handle.await.unwrap();
    }
}
