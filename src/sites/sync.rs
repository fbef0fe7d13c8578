use std::{collections::BTreeSet, sync::Arc};

use anyhow::Result;
use serde::Serialize;

use crate::{bridge::BrowserBridge, db::Database};

use super::hosts::{is_wildcard_origin, origin_host, site_matches};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// What one reconcile pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Tracked sites dropped because access is no longer granted.
    pub pruned: Vec<String>,
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    /// Grants were not known yet, so nothing was touched.
    pub skipped: bool,
}

/// Keeps tracked sites, granted origins and registered render clients in
/// agreement. Safe to run any number of times.
#[derive(Clone)]
pub struct SiteSync {
    db: Database,
    bridge: Arc<dyn BrowserBridge>,
}

impl SiteSync {
    pub fn new(db: Database, bridge: Arc<dyn BrowserBridge>) -> Self {
        Self { db, bridge }
    }

    pub async fn reconcile(&self) -> Result<SyncReport> {
        let Some(origins) = self.bridge.granted_origins() else {
            return Ok(SyncReport {
                skipped: true,
                ..SyncReport::default()
            });
        };

        let tracked = self.db.tracked_sites().await?;
        let with_grant: Vec<String> = tracked
            .iter()
            .filter(|site| is_granted(site, &origins))
            .cloned()
            .collect();

        let pruned: Vec<String> = tracked
            .iter()
            .filter(|site| !with_grant.contains(site))
            .cloned()
            .collect();
        if !pruned.is_empty() {
            log_warn!("Access revoked for {pruned:?}; no longer tracking them");
            self.db.set_tracked_sites(with_grant.clone()).await?;
        }

        let wanted: BTreeSet<&String> = with_grant.iter().collect();
        let registered = self.bridge.registered_clients();
        let have: BTreeSet<&String> = registered.iter().collect();

        let installed: Vec<String> = wanted.difference(&have).map(|s| (*s).clone()).collect();
        let removed: Vec<String> = have.difference(&wanted).map(|s| (*s).clone()).collect();

        if !installed.is_empty() {
            self.bridge.register_clients(&installed)?;
        }
        if !removed.is_empty() {
            self.bridge.unregister_clients(&removed)?;
        }
        if !installed.is_empty() || !removed.is_empty() {
            log_info!("Render clients: +{installed:?} -{removed:?}");
        }

        Ok(SyncReport {
            pruned,
            installed,
            removed,
            skipped: false,
        })
    }
}

/// A site is covered by a wildcard grant, a grant for the site itself, or a
/// grant for a parent domain (`*.a.com` style patterns reduce to `a.com`).
pub fn is_granted(site: &str, origins: &[String]) -> bool {
    origins.iter().any(|origin| {
        is_wildcard_origin(origin)
            || origin_host(origin).is_some_and(|host| site_matches(site, &host))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bridge::TabInfo,
        error::TrackerResult,
        protocol::{TabDirective, TabId},
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct GrantBridge {
        origins: Option<Vec<String>>,
        registered: Mutex<Vec<String>>,
    }

    impl GrantBridge {
        fn granting(origins: &[&str]) -> Self {
            Self {
                origins: Some(origins.iter().map(|o| o.to_string()).collect()),
                registered: Mutex::new(Vec::new()),
            }
        }
    }

    impl BrowserBridge for GrantBridge {
        fn tab(&self, _tab_id: TabId) -> Option<TabInfo> {
            None
        }
        fn tabs(&self) -> Vec<TabInfo> {
            Vec::new()
        }
        fn focused_tab(&self) -> Option<TabId> {
            None
        }
        fn send_to_tab(&self, _tab_id: TabId, _directive: TabDirective) -> TrackerResult<()> {
            Ok(())
        }
        fn granted_origins(&self) -> Option<Vec<String>> {
            self.origins.clone()
        }
        fn registered_clients(&self) -> Vec<String> {
            self.registered.lock().unwrap().clone()
        }
        fn register_clients(&self, hosts: &[String]) -> TrackerResult<()> {
            self.registered.lock().unwrap().extend_from_slice(hosts);
            Ok(())
        }
        fn unregister_clients(&self, hosts: &[String]) -> TrackerResult<()> {
            self.registered
                .lock()
                .unwrap()
                .retain(|host| !hosts.contains(host));
            Ok(())
        }
    }

    #[tokio::test]
    async fn narrows_to_granted_sites() {
        let db = Database::in_memory().unwrap();
        db.set_tracked_sites(vec!["a.com".into(), "b.com".into()])
            .await
            .unwrap();
        let bridge = Arc::new(GrantBridge::granting(&["https://a.com/*"]));
        let sync = SiteSync::new(db.clone(), bridge.clone());

        let report = sync.reconcile().await.unwrap();
        assert_eq!(report.pruned, vec!["b.com".to_string()]);
        assert_eq!(report.installed, vec!["a.com".to_string()]);
        assert_eq!(db.tracked_sites().await.unwrap(), vec!["a.com".to_string()]);
        assert_eq!(bridge.registered_clients(), vec!["a.com".to_string()]);

        let again = sync.reconcile().await.unwrap();
        assert_eq!(again, SyncReport::default());
    }

    #[tokio::test]
    async fn removes_stale_registrations() {
        let db = Database::in_memory().unwrap();
        db.set_tracked_sites(vec!["a.com".into()]).await.unwrap();
        let bridge = Arc::new(GrantBridge::granting(&["<all_urls>"]));
        bridge.register_clients(&["old.com".to_string()]).unwrap();

        let report = SiteSync::new(db, bridge.clone()).reconcile().await.unwrap();
        assert_eq!(report.removed, vec!["old.com".to_string()]);
        assert_eq!(bridge.registered_clients(), vec!["a.com".to_string()]);
    }

    #[tokio::test]
    async fn unknown_grants_leave_sites_alone() {
        let db = Database::in_memory().unwrap();
        db.set_tracked_sites(vec!["a.com".into()]).await.unwrap();
        let report = SiteSync::new(db.clone(), Arc::new(GrantBridge::default()))
            .reconcile()
            .await
            .unwrap();
        assert!(report.skipped);
        assert_eq!(db.tracked_sites().await.unwrap(), vec!["a.com".to_string()]);
    }

    #[test]
    fn parent_domain_grant_covers_subdomain_site() {
        let origins = vec!["*://*.example.com/*".to_string()];
        assert!(is_granted("news.example.com", &origins));
        assert!(!is_granted("example.org", &origins));
    }
}
