use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::StoreKey;

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("failed to parse {field}"))
}

/// Reads and decodes one key. A value that no longer decodes is treated as
/// missing so a bad write cannot wedge every later read.
pub fn read_json<T: DeserializeOwned>(conn: &Connection, key: StoreKey) -> Result<Option<T>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key.as_str()],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("failed to read {}", key.as_str()))?;

    let Some(raw) = raw else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!("Ignoring undecodable value for {}: {err}", key.as_str());
            Ok(None)
        }
    }
}

pub fn read_json_or_default<T: DeserializeOwned + Default>(
    conn: &Connection,
    key: StoreKey,
) -> Result<T> {
    Ok(read_json(conn, key)?.unwrap_or_default())
}

pub fn write_json<T: Serialize + ?Sized>(conn: &Connection, key: StoreKey, value: &T) -> Result<()> {
    let encoded = serde_json::to_string(value)
        .with_context(|| format!("failed to encode {}", key.as_str()))?;
    conn.execute(
        "INSERT INTO kv_store (key, value, updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
        params![key.as_str(), encoded, Utc::now().to_rfc3339()],
    )
    .with_context(|| format!("failed to write {}", key.as_str()))?;
    Ok(())
}

pub fn delete_key(conn: &Connection, key: StoreKey) -> Result<()> {
    conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key.as_str()])
        .with_context(|| format!("failed to delete {}", key.as_str()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;

    fn conn() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        conn
    }

    #[test]
    fn write_then_read_overwrites() {
        let conn = conn();
        write_json(&conn, StoreKey::TrackedSites, &vec!["a.com"]).unwrap();
        write_json(&conn, StoreKey::TrackedSites, &vec!["b.com"]).unwrap();
        let sites: Vec<String> = read_json(&conn, StoreKey::TrackedSites).unwrap().unwrap();
        assert_eq!(sites, vec!["b.com".to_string()]);
    }

    #[test]
    fn undecodable_value_reads_as_missing() {
        let conn = conn();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES ('aiEnabled', 'not json', '')",
            [],
        )
        .unwrap();
        let value: Option<bool> = read_json(&conn, StoreKey::AiEnabled).unwrap();
        assert!(value.is_none());
        let fallback: bool = read_json_or_default(&conn, StoreKey::AiEnabled).unwrap();
        assert!(!fallback);
    }

    #[test]
    fn delete_removes_key() {
        let conn = conn();
        write_json(&conn, StoreKey::AiEnabled, &true).unwrap();
        delete_key(&conn, StoreKey::AiEnabled).unwrap();
        assert!(read_json::<bool>(&conn, StoreKey::AiEnabled).unwrap().is_none());
    }

    #[test]
    fn converts_integer_ranges() {
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_u64(-1, "total_ms").is_err());
        assert_eq!(parse_date("2024-02-29", "date").unwrap().to_string(), "2024-02-29");
    }
}
