//! The `daily-reset` alarm.

use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime};
use log::{info, warn};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, db::Database};

use super::SessionCoordinator;

pub const ALARM_NAME: &str = "daily-reset";

/// The day a local instant is counted towards. Time before the reset hour
/// still belongs to the previous day.
pub fn logical_day(local_now: NaiveDateTime, reset_hour: u32) -> NaiveDate {
    (local_now - ChronoDuration::hours(i64::from(reset_hour))).date()
}

/// Next local instant at `reset_hour`, strictly after `local_now`.
pub fn next_fire(local_now: NaiveDateTime, reset_hour: u32) -> NaiveDateTime {
    let at = NaiveTime::from_hms_opt(reset_hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = local_now.date().and_time(at);
    if today > local_now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

fn until_next_fire(local_now: NaiveDateTime, reset_hour: u32) -> Duration {
    (next_fire(local_now, reset_hour) - local_now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Fires the coordinator's daily reset at the configured hour, and
/// immediately when the stored day is already behind.
pub struct DailyResetAlarm {
    coordinator: SessionCoordinator,
    db: Database,
    clock: Arc<dyn Clock>,
    reset_hour: watch::Receiver<u32>,
}

impl DailyResetAlarm {
    pub fn new(
        coordinator: SessionCoordinator,
        db: Database,
        clock: Arc<dyn Clock>,
        reset_hour: watch::Receiver<u32>,
    ) -> Self {
        Self {
            coordinator,
            db,
            clock,
            reset_hour,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let hour = *self.reset_hour.borrow_and_update();
            self.catch_up(hour).await;

            let wait = until_next_fire(self.clock.local_now(), hour);
            info!("{ALARM_NAME} armed for hour {hour}, firing in {}s", wait.as_secs());

            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = self.reset_hour.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    self.fire(hour).await;
                }
            }
        }

        info!("{ALARM_NAME} stopped");
    }

    /// Resets when the stored day is older than the current logical day.
    /// Returns whether a reset ran.
    pub async fn catch_up(&self, hour: u32) -> bool {
        match self.stale_day(hour).await {
            Some((stored, today)) => {
                info!("{ALARM_NAME}: missed reset for {stored}, catching up");
                self.reset_to(today).await
            }
            None => false,
        }
    }

    /// The scheduled fire. Does nothing if the wall clock has not yet
    /// reached the next logical day.
    async fn fire(&self, hour: u32) -> bool {
        match self.stale_day(hour).await {
            Some((_, today)) => self.reset_to(today).await,
            None => {
                warn!("{ALARM_NAME}: woke before the day changed; re-arming");
                false
            }
        }
    }

    /// The stored day and the current logical day, when the stored one is behind.
    async fn stale_day(&self, hour: u32) -> Option<(NaiveDate, NaiveDate)> {
        let today = logical_day(self.clock.local_now(), hour);
        match self.db.daily_time().await {
            Ok(Some(daily)) if daily.date < today => Some((daily.date, today)),
            Ok(_) => None,
            Err(err) => {
                warn!("{ALARM_NAME}: could not read the stored day: {err:#}");
                None
            }
        }
    }

    async fn reset_to(&self, day: NaiveDate) -> bool {
        match self.coordinator.daily_reset(day).await {
            Ok(_) => true,
            Err(err) => {
                warn!("{ALARM_NAME}: reset to {day} failed: {err}");
                false
            }
        }
    }
}
