//! Hard time-limit gate.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::{clock::Clock, db::models::BlockingSettings, db::Database};

/// True when `url` must be blocked: blocking is on, no grace period is
/// running, today's total has reached the limit, and no exception pattern
/// occurs in the url.
pub fn is_blocked(
    url: &str,
    settings: &BlockingSettings,
    daily_total_ms: u64,
    now: DateTime<Utc>,
) -> bool {
    settings.enabled
        && now >= settings.grace_period_until
        && daily_total_ms >= settings.time_limit
        && !settings
            .url_exceptions
            .iter()
            .any(|pattern| url.contains(pattern.as_str()))
}

/// Read path for the UI. Evaluates the gate against the live total, which
/// includes a still-running session.
#[derive(Clone)]
pub struct BlockingGate {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl BlockingGate {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn check(&self, url: &str) -> Result<bool> {
        let slice = self.db.load_ledger().await?;
        let now = self.clock.now();
        Ok(is_blocked(url, &slice.blocking, slice.live_total(now), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        db::models::{ActiveSession, DailyTime},
        protocol::TabId,
    };
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 15, 0, 0).unwrap()
    }

    fn hour_limit() -> BlockingSettings {
        BlockingSettings {
            enabled: true,
            time_limit: 3_600_000,
            grace_period_until: now() - Duration::minutes(1),
            url_exceptions: vec!["x.com/messages".into()],
        }
    }

    #[test]
    fn exception_substring_escapes_block() {
        let settings = hour_limit();
        assert!(is_blocked("https://x.com/home", &settings, 3_600_000, now()));
        assert!(!is_blocked(
            "https://x.com/messages/42",
            &settings,
            3_600_000,
            now()
        ));
        assert!(!is_blocked("https://x.com/home", &settings, 3_599_999, now()));
    }

    #[test]
    fn grace_period_is_a_deadline() {
        let mut settings = hour_limit();
        settings.grace_period_until = now() + Duration::minutes(5);
        assert!(!is_blocked("https://x.com/home", &settings, 9_000_000, now()));
        assert!(is_blocked(
            "https://x.com/home",
            &settings,
            9_000_000,
            now() + Duration::minutes(5)
        ));
    }

    #[test]
    fn disabled_gate_never_blocks() {
        let settings = BlockingSettings {
            enabled: false,
            ..hour_limit()
        };
        assert!(!is_blocked("https://x.com/home", &settings, u64::MAX, now()));
    }

    #[tokio::test]
    async fn gate_counts_running_session() {
        let db = Database::in_memory().unwrap();
        let clock = ManualClock::new(now());
        db.set_blocking_settings(hour_limit()).await.unwrap();
        db.save_ledger(
            DailyTime {
                total: 3_590_000,
                date: now().date_naive(),
            },
            Some(ActiveSession::begin(TabId(1), now())),
        )
        .await
        .unwrap();

        let gate = BlockingGate::new(db, Arc::new(clock.clone()));
        assert!(!gate.check("https://x.com/home").await.unwrap());

        clock.advance(Duration::seconds(10));
        assert!(gate.check("https://x.com/home").await.unwrap());
    }
}
