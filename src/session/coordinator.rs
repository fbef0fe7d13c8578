use std::{collections::HashMap, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::{
    blocking::is_blocked,
    bridge::BrowserBridge,
    classify::{Classifier, Verdict},
    clock::Clock,
    db::{
        models::{ActiveSession, DailyTime, LedgerSlice},
        Database,
    },
    error::{TrackerError, TrackerResult},
    protocol::{TabDirective, TabId},
    sites::hosts::{host_of, page_key, tracked_site_for},
};

use super::reset::logical_day;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

/// The most recent classification a tab reported for its page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageVerdict {
    pub url: String,
    pub verdict: Verdict,
}

/// Ledger state as seen after a coordinator turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub date: NaiveDate,
    /// Folded total plus the running session's elapsed time.
    pub total: u64,
    pub active_tab: Option<TabId>,
}

type Reply<T> = oneshot::Sender<TrackerResult<T>>;

enum CoordinatorCommand {
    RequestActiveTab {
        candidate: Option<TabId>,
        reply: Reply<LedgerSnapshot>,
    },
    RecordVerdict {
        tab_id: TabId,
        verdict: PageVerdict,
    },
    ForgetTab {
        tab_id: TabId,
    },
    DailyReset {
        day: NaiveDate,
        reply: Reply<DailyTime>,
    },
    Snapshot {
        reply: Reply<LedgerSnapshot>,
    },
}

/// Handle to the actor that owns the daily ledger.
///
/// Every call is queued on one mailbox and handled to completion before the
/// next one starts, in arrival order. The last request to arrive decides
/// which tab is accruing time.
#[derive(Clone)]
pub struct SessionCoordinator {
    tx: mpsc::UnboundedSender<CoordinatorCommand>,
}

impl SessionCoordinator {
    pub fn spawn(
        db: Database,
        bridge: Arc<dyn BrowserBridge>,
        classifier: Classifier,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = CoordinatorActor {
            db,
            bridge,
            classifier,
            clock,
            verdicts: HashMap::new(),
        };
        tokio::spawn(actor.run(rx));
        Self { tx }
    }

    /// Enqueues a request without waiting; the position in the queue is
    /// fixed when this returns.
    pub fn submit(&self, candidate: Option<TabId>) -> oneshot::Receiver<TrackerResult<LedgerSnapshot>> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(CoordinatorCommand::RequestActiveTab { candidate, reply })
            .is_err()
        {
            log_error!("Coordinator mailbox closed; dropping request for {candidate:?}");
        }
        rx
    }

    pub async fn request_active_tab(&self, candidate: Option<TabId>) -> TrackerResult<LedgerSnapshot> {
        await_reply(self.submit(candidate)).await
    }

    pub fn record_verdict(&self, tab_id: TabId, url: &str, verdict: Verdict) {
        let verdict = PageVerdict {
            url: page_key(url),
            verdict,
        };
        let _ = self
            .tx
            .send(CoordinatorCommand::RecordVerdict { tab_id, verdict });
    }

    pub fn forget_tab(&self, tab_id: TabId) {
        let _ = self.tx.send(CoordinatorCommand::ForgetTab { tab_id });
    }

    /// Closes the current session and starts `day` from zero.
    pub async fn daily_reset(&self, day: NaiveDate) -> TrackerResult<DailyTime> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(CoordinatorCommand::DailyReset { day, reply });
        await_reply(rx).await
    }

    pub async fn snapshot(&self) -> TrackerResult<LedgerSnapshot> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(CoordinatorCommand::Snapshot { reply });
        await_reply(rx).await
    }
}

async fn await_reply<T>(rx: oneshot::Receiver<TrackerResult<T>>) -> TrackerResult<T> {
    rx.await
        .map_err(|_| TrackerError::Storage(anyhow!("session coordinator stopped")))?
}

struct CoordinatorActor {
    db: Database,
    bridge: Arc<dyn BrowserBridge>,
    classifier: Classifier,
    clock: Arc<dyn Clock>,
    verdicts: HashMap<TabId, PageVerdict>,
}

impl CoordinatorActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CoordinatorCommand>) {
        log_info!("Session coordinator started");

        while let Some(command) = rx.recv().await {
            match command {
                CoordinatorCommand::RequestActiveTab { candidate, reply } => {
                    let result = self.request_active_tab(candidate).await;
                    if let Err(err) = &result {
                        log_error!("Active tab request for {candidate:?} failed: {err:#}");
                    }
                    let _ = reply.send(result.map_err(TrackerError::from));
                }
                CoordinatorCommand::RecordVerdict { tab_id, verdict } => {
                    self.verdicts.insert(tab_id, verdict);
                }
                CoordinatorCommand::ForgetTab { tab_id } => {
                    self.verdicts.remove(&tab_id);
                }
                CoordinatorCommand::DailyReset { day, reply } => {
                    let result = self.daily_reset(day).await;
                    if let Err(err) = &result {
                        log_error!("Daily reset to {day} failed: {err:#}");
                    }
                    let _ = reply.send(result.map_err(TrackerError::from));
                }
                CoordinatorCommand::Snapshot { reply } => {
                    let result = self.snapshot().await;
                    let _ = reply.send(result.map_err(TrackerError::from));
                }
            }
        }

        log_info!("Session coordinator shutting down");
    }

    async fn request_active_tab(&mut self, candidate: Option<TabId>) -> Result<LedgerSnapshot> {
        let slice = self.db.load_ledger().await?;
        let now = self.clock.now();

        let mut daily = self.current_day(&slice);
        if let Some(previous) = &slice.active_session {
            let elapsed = previous.elapsed_ms(now);
            daily.total = daily.total.saturating_add(elapsed);
            log_debug!("Folded {elapsed}ms from tab {}", previous.tab_id);
            self.notify(previous.tab_id, TabDirective::StopTicking);
        }

        let winner = match candidate {
            Some(tab_id) => self
                .is_eligible(tab_id, &slice, daily.total, now)
                .await
                .then_some(tab_id),
            None => None,
        };

        let total = daily.total;
        let date = daily.date;
        match winner {
            Some(tab_id) => {
                self.db
                    .save_ledger(daily, Some(ActiveSession::begin(tab_id, now)))
                    .await?;
                self.notify(
                    tab_id,
                    TabDirective::StartTicking {
                        starting_duration: total,
                        start_time: now,
                    },
                );
            }
            None => self.db.save_ledger(daily, None).await?,
        }

        Ok(LedgerSnapshot {
            date,
            total,
            active_tab: winner,
        })
    }

    async fn is_eligible(
        &self,
        tab_id: TabId,
        slice: &LedgerSlice,
        total: u64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(tab) = self.bridge.tab(tab_id) else {
            log_debug!("Tab {tab_id} is gone; treating as no candidate");
            return false;
        };
        let Some(host) = host_of(&tab.url) else {
            return false;
        };
        if tracked_site_for(&host, &slice.tracked_sites).is_none() {
            return false;
        }

        let key = page_key(&tab.url);
        let verdict = match self.verdicts.get(&tab_id) {
            Some(recorded) if recorded.url == key => recorded.verdict,
            _ => self.classifier.classify_offline(&tab.url).await.verdict,
        };
        if verdict == Verdict::Productive {
            log_debug!("Tab {tab_id} is on a productive page; not tracking");
            return false;
        }

        if is_blocked(&tab.url, &slice.blocking, total, now) {
            log_debug!("Tab {tab_id} is past the time limit; not tracking");
            return false;
        }

        true
    }

    async fn daily_reset(&mut self, day: NaiveDate) -> Result<DailyTime> {
        let folded = self.request_active_tab(None).await?;
        let closing = DailyTime {
            total: folded.total,
            date: folded.date,
        };
        let fresh = DailyTime::empty(day);

        self.db.close_day(closing.clone(), fresh.clone()).await?;
        log_info!(
            "Closed {} with {}ms; tracking {} from zero",
            closing.date,
            closing.total,
            day
        );

        let tracked = self.db.tracked_sites().await?;
        for tab in self.bridge.tabs() {
            let on_tracked_site = host_of(&tab.url)
                .is_some_and(|host| tracked_site_for(&host, &tracked).is_some());
            if on_tracked_site {
                self.notify(tab.tab_id, TabDirective::UpdateFrame { time: 0 });
            }
        }

        Ok(fresh)
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot> {
        let slice = self.db.load_ledger().await?;
        let now = self.clock.now();
        let daily = self.current_day(&slice);
        Ok(LedgerSnapshot {
            date: daily.date,
            total: slice.live_total(now),
            active_tab: slice.active_session.map(|session| session.tab_id),
        })
    }

    fn current_day(&self, slice: &LedgerSlice) -> DailyTime {
        slice.daily_time.clone().unwrap_or_else(|| {
            DailyTime::empty(logical_day(self.clock.local_now(), slice.reset_time.hour))
        })
    }

    fn notify(&self, tab_id: TabId, directive: TabDirective) {
        if let Err(err) = self.bridge.send_to_tab(tab_id, directive) {
            log_debug!("Dropped directive for tab {tab_id}: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::TabInfo,
        classify::NoAiClassifier,
        clock::ManualClock,
        db::models::BlockingSettings,
    };
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBridge {
        tabs: Mutex<HashMap<TabId, String>>,
        unreachable: Mutex<Vec<TabId>>,
        sent: Mutex<Vec<(TabId, TabDirective)>>,
    }

    impl FakeBridge {
        fn open(&self, tab_id: i64, url: &str) {
            self.tabs.lock().unwrap().insert(TabId(tab_id), url.into());
        }

        fn close(&self, tab_id: i64) {
            self.tabs.lock().unwrap().remove(&TabId(tab_id));
        }

        fn sent(&self) -> Vec<(TabId, TabDirective)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl BrowserBridge for FakeBridge {
        fn tab(&self, tab_id: TabId) -> Option<TabInfo> {
            self.tabs.lock().unwrap().get(&tab_id).map(|url| TabInfo {
                tab_id,
                url: url.clone(),
            })
        }

        fn tabs(&self) -> Vec<TabInfo> {
            self.tabs
                .lock()
                .unwrap()
                .iter()
                .map(|(tab_id, url)| TabInfo {
                    tab_id: *tab_id,
                    url: url.clone(),
                })
                .collect()
        }

        fn focused_tab(&self) -> Option<TabId> {
            None
        }

        fn send_to_tab(&self, tab_id: TabId, directive: TabDirective) -> TrackerResult<()> {
            if self.unreachable.lock().unwrap().contains(&tab_id) {
                return Err(TrackerError::Unreachable(tab_id));
            }
            self.sent.lock().unwrap().push((tab_id, directive));
            Ok(())
        }

        fn granted_origins(&self) -> Option<Vec<String>> {
            None
        }

        fn registered_clients(&self) -> Vec<String> {
            Vec::new()
        }

        fn register_clients(&self, _hosts: &[String]) -> TrackerResult<()> {
            Ok(())
        }

        fn unregister_clients(&self, _hosts: &[String]) -> TrackerResult<()> {
            Ok(())
        }
    }

    struct Harness {
        db: Database,
        bridge: Arc<FakeBridge>,
        clock: ManualClock,
        coordinator: SessionCoordinator,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    async fn harness() -> Harness {
        let db = Database::in_memory().unwrap();
        db.set_tracked_sites(vec!["x.com".into(), "youtube.com".into()])
            .await
            .unwrap();
        let bridge = Arc::new(FakeBridge::default());
        let clock = ManualClock::new(start());
        let classifier = Classifier::new(
            db.clone(),
            Arc::new(NoAiClassifier),
            std::time::Duration::from_millis(100),
        );
        let coordinator =
            SessionCoordinator::spawn(db.clone(), bridge.clone(), classifier, Arc::new(clock.clone()));
        Harness {
            db,
            bridge,
            clock,
            coordinator,
        }
    }

    #[tokio::test]
    async fn tracked_tab_starts_ticking_from_folded_total() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/home");

        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.active_tab, Some(TabId(1)));
        assert_eq!(snapshot.total, 0);

        h.clock.advance(Duration::seconds(5));
        h.bridge.open(2, "https://www.youtube.com/watch?v=1");
        let snapshot = h.coordinator.request_active_tab(Some(TabId(2))).await.unwrap();
        assert_eq!(snapshot.total, 5_000);

        let sent = h.bridge.sent();
        assert_eq!(sent[1], (TabId(1), TabDirective::StopTicking));
        assert_eq!(
            sent[2],
            (
                TabId(2),
                TabDirective::StartTicking {
                    starting_duration: 5_000,
                    start_time: start() + Duration::seconds(5),
                }
            )
        );
        let session = h.db.active_session().await.unwrap().unwrap();
        assert_eq!(session.tab_id, TabId(2));
    }

    #[tokio::test]
    async fn repeated_null_request_adds_nothing() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/home");
        h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();

        h.clock.advance(Duration::seconds(3));
        let first = h.coordinator.request_active_tab(None).await.unwrap();
        h.clock.advance(Duration::seconds(30));
        let second = h.coordinator.request_active_tab(None).await.unwrap();

        assert_eq!(first.total, 3_000);
        assert_eq!(second.total, 3_000);
        assert!(h.db.active_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn untracked_closed_and_productive_tabs_do_not_accrue() {
        let h = harness().await;
        h.bridge.open(1, "https://docs.rs/tokio");
        h.bridge.open(2, "https://x.com/rust");
        h.db.set_url_rule("https://x.com/rust".into(), Verdict::Productive)
            .await
            .unwrap();

        for candidate in [TabId(1), TabId(2), TabId(99)] {
            let snapshot = h.coordinator.request_active_tab(Some(candidate)).await.unwrap();
            assert_eq!(snapshot.active_tab, None);
        }
        assert!(h.bridge.sent().is_empty());
    }

    #[tokio::test]
    async fn recorded_verdict_applies_only_to_its_url() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/rust");
        h.coordinator
            .record_verdict(TabId(1), "https://x.com/rust#replies", Verdict::Productive);

        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.active_tab, None);

        h.bridge.open(1, "https://x.com/home");
        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.active_tab, Some(TabId(1)));
    }

    #[tokio::test]
    async fn blocked_tab_does_not_accrue() {
        let h = harness().await;
        h.db.set_blocking_settings(BlockingSettings {
            enabled: true,
            time_limit: 2_000,
            ..BlockingSettings::default()
        })
        .await
        .unwrap();
        h.bridge.open(1, "https://x.com/home");

        h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        h.clock.advance(Duration::seconds(2));
        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.total, 2_000);
        assert_eq!(snapshot.active_tab, None);
    }

    #[tokio::test]
    async fn unreachable_tab_still_updates_ledger() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/home");
        h.bridge.unreachable.lock().unwrap().push(TabId(1));

        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.active_tab, Some(TabId(1)));

        h.bridge.close(1);
        h.clock.advance(Duration::seconds(4));
        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.total, 4_000);
        assert_eq!(snapshot.active_tab, None);
    }

    #[tokio::test]
    async fn last_submission_wins() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/home");
        h.bridge.open(2, "https://x.com/explore");

        let first = h.coordinator.submit(Some(TabId(1)));
        let second = h.coordinator.submit(Some(TabId(2)));
        let third = h.coordinator.submit(Some(TabId(1)));
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        let last = third.await.unwrap().unwrap();

        assert_eq!(last.active_tab, Some(TabId(1)));
        let session = h.db.active_session().await.unwrap().unwrap();
        assert_eq!(session.tab_id, TabId(1));
    }

    #[tokio::test]
    async fn daily_reset_folds_archives_and_zeroes() {
        let h = harness().await;
        h.db.save_ledger(
            DailyTime {
                total: 7_200_000,
                date: start().date_naive(),
            },
            None,
        )
        .await
        .unwrap();
        h.bridge.open(1, "https://x.com/home");
        h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        h.clock.advance(Duration::seconds(60));

        let next_day = start().date_naive().succ_opt().unwrap();
        let fresh = h.coordinator.daily_reset(next_day).await.unwrap();
        assert_eq!(fresh, DailyTime::empty(next_day));

        let slice = h.db.load_ledger().await.unwrap();
        assert_eq!(slice.daily_time, Some(DailyTime::empty(next_day)));
        assert!(slice.active_session.is_none());

        let history = h.db.daily_history(7).await.unwrap();
        assert_eq!(history[0].total, 7_260_000);
        assert!(h
            .bridge
            .sent()
            .contains(&(TabId(1), TabDirective::UpdateFrame { time: 0 })));
    }

    #[tokio::test]
    async fn snapshot_reports_live_total() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/home");
        h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        h.clock.advance(Duration::milliseconds(1_500));

        let snapshot = h.coordinator.snapshot().await.unwrap();
        assert_eq!(snapshot.total, 1_500);
        assert_eq!(snapshot.active_tab, Some(TabId(1)));
        assert_eq!(h.db.daily_time().await.unwrap().unwrap().total, 0);
    }

    async fn reject_store_writes(db: &Database, reject: bool) {
        let sql = if reject {
            "CREATE TEMP TRIGGER reject_insert BEFORE INSERT ON kv_store
                 BEGIN SELECT RAISE(ABORT, 'store offline'); END;
             CREATE TEMP TRIGGER reject_update BEFORE UPDATE ON kv_store
                 BEGIN SELECT RAISE(ABORT, 'store offline'); END;
             CREATE TEMP TRIGGER reject_delete BEFORE DELETE ON kv_store
                 BEGIN SELECT RAISE(ABORT, 'store offline'); END;"
        } else {
            "DROP TRIGGER reject_insert;
             DROP TRIGGER reject_update;
             DROP TRIGGER reject_delete;"
        };
        db.execute(move |conn| {
            conn.execute_batch(sql)?;
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_pair_and_folds_once_later() {
        let h = harness().await;
        h.bridge.open(1, "https://x.com/home");
        h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        h.clock.advance(Duration::seconds(30));

        reject_store_writes(&h.db, true).await;
        let err = h
            .coordinator
            .request_active_tab(Some(TabId(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::StorageUnavailable);

        // Nothing was half-written: the original session is still open.
        let session = h.db.active_session().await.unwrap().unwrap();
        assert_eq!(session.start_time, start());
        assert_eq!(h.db.daily_time().await.unwrap().unwrap().total, 0);

        reject_store_writes(&h.db, false).await;
        h.clock.advance(Duration::seconds(10));
        let snapshot = h.coordinator.request_active_tab(None).await.unwrap();
        assert_eq!(snapshot.total, 40_000);
        assert_eq!(snapshot.active_tab, None);
        assert_eq!(h.db.daily_time().await.unwrap().unwrap().total, 40_000);
        assert!(h.db.active_session().await.unwrap().is_none());

        let snapshot = h.coordinator.request_active_tab(None).await.unwrap();
        assert_eq!(snapshot.total, 40_000);
    }

    #[tokio::test]
    async fn unreadable_store_fails_the_call_not_the_coordinator() {
        let h = harness().await;
        h.db.execute(|conn| {
            conn.execute_batch("ALTER TABLE kv_store RENAME TO kv_store_offline")?;
            Ok(())
        })
        .await
        .unwrap();

        h.bridge.open(1, "https://x.com/home");
        let err = h
            .coordinator
            .request_active_tab(Some(TabId(1)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::StorageUnavailable);

        h.db.execute(|conn| {
            conn.execute_batch("ALTER TABLE kv_store_offline RENAME TO kv_store")?;
            Ok(())
        })
        .await
        .unwrap();
        let snapshot = h.coordinator.request_active_tab(Some(TabId(1))).await.unwrap();
        assert_eq!(snapshot.active_tab, Some(TabId(1)));
        assert_eq!(snapshot.total, 0);
    }
}
