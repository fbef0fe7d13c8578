use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::{
    connection::Database,
    helpers::{read_json, read_json_or_default, write_json},
    models::{BlockingSettings, OverlayConfig, ResetTime},
    StoreKey,
};

impl Database {
    pub async fn blocking_settings(&self) -> Result<BlockingSettings> {
        self.execute(|conn| read_json_or_default(conn, StoreKey::BlockingSettings))
            .await
    }

    pub async fn set_blocking_settings(&self, settings: BlockingSettings) -> Result<()> {
        self.execute(move |conn| write_json(conn, StoreKey::BlockingSettings, &settings))
            .await
    }

    /// Moves only the grace deadline, leaving the rest of the policy as the
    /// UI last wrote it.
    pub async fn set_grace_period_until(&self, until: DateTime<Utc>) -> Result<BlockingSettings> {
        self.execute(move |conn| {
            let mut settings: BlockingSettings =
                read_json_or_default(conn, StoreKey::BlockingSettings)?;
            settings.grace_period_until = until;
            write_json(conn, StoreKey::BlockingSettings, &settings)?;
            Ok(settings)
        })
        .await
    }

    pub async fn overlay_config(&self) -> Result<OverlayConfig> {
        self.execute(|conn| read_json_or_default(conn, StoreKey::OverlayConfig))
            .await
    }

    pub async fn set_overlay_config(&self, config: OverlayConfig) -> Result<()> {
        self.execute(move |conn| write_json(conn, StoreKey::OverlayConfig, &config))
            .await
    }

    pub async fn set_overlay_visible(&self, visible: bool) -> Result<OverlayConfig> {
        self.execute(move |conn| {
            let mut config: OverlayConfig = read_json_or_default(conn, StoreKey::OverlayConfig)?;
            config.visible = visible;
            write_json(conn, StoreKey::OverlayConfig, &config)?;
            Ok(config)
        })
        .await
    }

    pub async fn reset_time(&self) -> Result<ResetTime> {
        self.execute(|conn| read_json_or_default(conn, StoreKey::ResetTime))
            .await
    }

    /// Stored reset time, seeding `default_hour` when none has been saved.
    pub async fn reset_time_or_seed(&self, default_hour: u32) -> Result<ResetTime> {
        self.execute(move |conn| {
            if let Some(stored) = read_json::<ResetTime>(conn, StoreKey::ResetTime)? {
                return Ok(stored);
            }
            let seeded = ResetTime { hour: default_hour };
            write_json(conn, StoreKey::ResetTime, &seeded)?;
            Ok(seeded)
        })
        .await
    }

    pub async fn set_reset_time(&self, reset_time: ResetTime) -> Result<()> {
        self.execute(move |conn| write_json(conn, StoreKey::ResetTime, &reset_time))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn grace_period_update_preserves_policy() {
        let db = Database::in_memory().unwrap();
        db.set_blocking_settings(BlockingSettings {
            enabled: true,
            time_limit: 1000,
            url_exceptions: vec!["docs.x.com".into()],
            ..BlockingSettings::default()
        })
        .await
        .unwrap();

        let until = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let updated = db.set_grace_period_until(until).await.unwrap();
        assert_eq!(updated.grace_period_until, until);
        assert_eq!(updated.time_limit, 1000);
        assert_eq!(db.blocking_settings().await.unwrap().url_exceptions.len(), 1);
    }

    #[tokio::test]
    async fn overlay_visibility_round_trips() {
        let db = Database::in_memory().unwrap();
        assert!(db.overlay_config().await.unwrap().visible);
        let config = db.set_overlay_visible(false).await.unwrap();
        assert!(!config.visible);
        assert!(!db.overlay_config().await.unwrap().visible);
    }

    #[tokio::test]
    async fn reset_time_defaults_to_midnight() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.reset_time().await.unwrap(), ResetTime { hour: 0 });
        db.set_reset_time(ResetTime { hour: 4 }).await.unwrap();
        assert_eq!(db.reset_time().await.unwrap().hour, 4);
    }

    #[tokio::test]
    async fn seeding_keeps_an_existing_reset_time() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.reset_time_or_seed(5).await.unwrap().hour, 5);
        db.set_reset_time(ResetTime { hour: 2 }).await.unwrap();
        assert_eq!(db.reset_time_or_seed(5).await.unwrap().hour, 2);
    }
}
