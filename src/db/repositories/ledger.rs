use anyhow::{Context, Result};

use crate::db::{
    connection::Database,
    helpers::{delete_key, read_json, read_json_or_default, write_json},
    models::{ActiveSession, DailyTime, LedgerSlice},
    StoreKey,
};

impl Database {
    /// Reads everything one coordinator invocation needs in a single task.
    pub async fn load_ledger(&self) -> Result<LedgerSlice> {
        self.execute(|conn| {
            Ok(LedgerSlice {
                daily_time: read_json(conn, StoreKey::DailyTime)?,
                active_session: read_json(conn, StoreKey::ActiveSession)?,
                tracked_sites: read_json_or_default(conn, StoreKey::TrackedSites)?,
                blocking: read_json_or_default(conn, StoreKey::BlockingSettings)?,
                reset_time: read_json_or_default(conn, StoreKey::ResetTime)?,
            })
        })
        .await
    }

    /// Writes the daily total and the active session together; either both
    /// land or neither does.
    pub async fn save_ledger(
        &self,
        daily_time: DailyTime,
        active_session: Option<ActiveSession>,
    ) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open ledger transaction")?;
            write_json(&tx, StoreKey::DailyTime, &daily_time)?;
            match &active_session {
                Some(session) => write_json(&tx, StoreKey::ActiveSession, session)?,
                None => delete_key(&tx, StoreKey::ActiveSession)?,
            }
            tx.commit().context("failed to commit ledger")?;
            Ok(())
        })
        .await
    }

    pub async fn daily_time(&self) -> Result<Option<DailyTime>> {
        self.execute(|conn| read_json(conn, StoreKey::DailyTime)).await
    }

    pub async fn active_session(&self) -> Result<Option<ActiveSession>> {
        self.execute(|conn| read_json(conn, StoreKey::ActiveSession))
            .await
    }

    /// Removes a session left behind by an earlier process without folding
    /// its elapsed time.
    pub async fn discard_active_session(&self) -> Result<Option<ActiveSession>> {
        self.execute(|conn| {
            let stale: Option<ActiveSession> = read_json(conn, StoreKey::ActiveSession)?;
            if stale.is_some() {
                delete_key(conn, StoreKey::ActiveSession)?;
            }
            Ok(stale)
        })
        .await
    }
}
