use anyhow::Result;

use crate::{
    db::{
        connection::Database,
        helpers::{read_json_or_default, write_json},
        StoreKey,
    },
    error::{TrackerError, TrackerResult},
};

impl Database {
    pub async fn tracked_sites(&self) -> Result<Vec<String>> {
        self.execute(|conn| read_json_or_default(conn, StoreKey::TrackedSites))
            .await
    }

    pub async fn set_tracked_sites(&self, sites: Vec<String>) -> Result<()> {
        self.execute(move |conn| write_json(conn, StoreKey::TrackedSites, &sites))
            .await
    }

    /// Appends `site` unless it is already present.
    pub async fn add_tracked_site(&self, site: String) -> TrackerResult<Vec<String>> {
        self.execute(move |conn| {
            let mut sites: Vec<String> = read_json_or_default(conn, StoreKey::TrackedSites)?;
            if sites.iter().any(|existing| existing == &site) {
                return Ok(Err(TrackerError::AlreadyTracked(site)));
            }
            sites.push(site);
            write_json(conn, StoreKey::TrackedSites, &sites)?;
            Ok(Ok(sites))
        })
        .await?
    }

    pub async fn remove_tracked_site(&self, site: String) -> TrackerResult<Vec<String>> {
        self.execute(move |conn| {
            let mut sites: Vec<String> = read_json_or_default(conn, StoreKey::TrackedSites)?;
            let before = sites.len();
            sites.retain(|existing| existing != &site);
            if sites.len() == before {
                return Ok(Err(TrackerError::NotTracked(site)));
            }
            write_json(conn, StoreKey::TrackedSites, &sites)?;
            Ok(Ok(sites))
        })
        .await?
    }
}
