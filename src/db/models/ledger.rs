//! Ledger models: the daily total and the single active session.
//!
//! Both are only ever written by the session coordinator, and always
//! together.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    clock::elapsed_ms,
    db::models::{BlockingSettings, ResetTime},
    protocol::TabId,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyTime {
    /// Tracked milliseconds for `date`, excluding any still-running session.
    pub total: u64,
    pub date: NaiveDate,
}

impl DailyTime {
    pub fn empty(date: NaiveDate) -> Self {
        Self { total: 0, date }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    #[serde(default)]
    pub session_id: String,
    pub tab_id: TabId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
}

impl ActiveSession {
    pub fn begin(tab_id: TabId, now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            tab_id,
            start_time: now,
        }
    }

    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        elapsed_ms(self.start_time, now)
    }
}

/// Everything the coordinator reads at the start of one invocation.
#[derive(Debug, Clone, Default)]
pub struct LedgerSlice {
    pub daily_time: Option<DailyTime>,
    pub active_session: Option<ActiveSession>,
    pub tracked_sites: Vec<String>,
    pub blocking: BlockingSettings,
    pub reset_time: ResetTime,
}

impl LedgerSlice {
    /// Persisted total plus whatever the running session has accrued so far.
    pub fn live_total(&self, now: DateTime<Utc>) -> u64 {
        let folded = self.daily_time.as_ref().map_or(0, |daily| daily.total);
        let running = self
            .active_session
            .as_ref()
            .map_or(0, |session| session.elapsed_ms(now));
        folded.saturating_add(running)
    }
}

/// A closed day's total, archived at reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total: u64,
}
