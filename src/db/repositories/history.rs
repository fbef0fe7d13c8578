use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::{delete_key, parse_date, to_i64, to_u64, write_json},
    models::{DailyTime, DailyTotal},
    StoreKey,
};

impl Database {
    /// Archives `closing` and installs `fresh` as the ledger with no active
    /// session, all in one transaction.
    pub async fn close_day(&self, closing: DailyTime, fresh: DailyTime) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open day-close transaction")?;
            tx.execute(
                "INSERT INTO daily_history (date, total_ms, closed_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(date) DO UPDATE SET
                     total_ms = daily_history.total_ms + excluded.total_ms,
                     closed_at = excluded.closed_at",
                params![
                    closing.date.format("%Y-%m-%d").to_string(),
                    to_i64(closing.total)?,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("failed to archive daily total")?;
            write_json(&tx, StoreKey::DailyTime, &fresh)?;
            delete_key(&tx, StoreKey::ActiveSession)?;
            tx.commit().context("failed to commit day close")?;
            Ok(())
        })
        .await
    }

    /// Most recent archived days, newest first.
    pub async fn daily_history(&self, days: u32) -> Result<Vec<DailyTotal>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, total_ms FROM daily_history
                 ORDER BY date DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![days])?;
            let mut history = Vec::new();
            while let Some(row) = rows.next()? {
                let date: String = row.get(0)?;
                let total: i64 = row.get(1)?;
                history.push(DailyTotal {
                    date: parse_date(&date, "date")?,
                    total: to_u64(total, "total_ms")?,
                });
            }

            Ok(history)
        })
        .await
    }
}
