use anyhow::Result;

use crate::{
    classify::Verdict,
    db::{
        connection::Database,
        helpers::{read_json_or_default, write_json},
        models::{AiCache, AiSettings, RuleSnapshot, UserRules},
        StoreKey,
    },
};

impl Database {
    /// Rules, AI cache and AI switches as one consistent read.
    pub async fn rule_snapshot(&self) -> Result<RuleSnapshot> {
        self.execute(|conn| {
            Ok(RuleSnapshot {
                rules: read_json_or_default(conn, StoreKey::UserRules)?,
                cache: read_json_or_default(conn, StoreKey::AiCache)?,
                ai: AiSettings {
                    enabled: read_json_or_default(conn, StoreKey::AiEnabled)?,
                    disabled_sites: read_json_or_default(conn, StoreKey::AiDisabledSites)?,
                },
            })
        })
        .await
    }

    pub async fn user_rules(&self) -> Result<UserRules> {
        self.execute(|conn| read_json_or_default(conn, StoreKey::UserRules))
            .await
    }

    pub async fn set_url_rule(&self, url: String, verdict: Verdict) -> Result<()> {
        self.update_user_rules(move |rules| {
            rules.urls.insert(url, verdict);
        })
        .await
    }

    pub async fn set_productive_channel(&self, channel: String, productive: bool) -> Result<()> {
        self.update_user_rules(move |rules| {
            if productive {
                rules.productive_channels.insert(channel);
            } else {
                rules.productive_channels.remove(&channel);
            }
        })
        .await
    }

    pub async fn set_productive_subreddit(&self, subreddit: String, productive: bool) -> Result<()> {
        self.update_user_rules(move |rules| {
            if productive {
                rules.productive_subreddits.insert(subreddit);
            } else {
                rules.productive_subreddits.remove(&subreddit);
            }
        })
        .await
    }

    async fn update_user_rules<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut UserRules) + Send + 'static,
    {
        self.execute(move |conn| {
            let mut rules: UserRules = read_json_or_default(conn, StoreKey::UserRules)?;
            edit(&mut rules);
            write_json(conn, StoreKey::UserRules, &rules)
        })
        .await
    }

    /// Stores an AI verdict unless one already exists for `url`, and returns
    /// whichever verdict the cache now holds.
    pub async fn cache_ai_verdict(&self, url: String, verdict: Verdict) -> Result<Verdict> {
        self.execute(move |conn| {
            let mut cache: AiCache = read_json_or_default(conn, StoreKey::AiCache)?;
            if let Some(existing) = cache.lookup(&url) {
                return Ok(existing);
            }
            cache.insert_if_absent(&url, verdict);
            write_json(conn, StoreKey::AiCache, &cache)?;
            Ok(verdict)
        })
        .await
    }

    /// Drops cached verdicts for one url, or all of them when `url` is None.
    pub async fn clear_ai_cache(&self, url: Option<String>) -> Result<usize> {
        self.execute(move |conn| {
            let mut cache: AiCache = read_json_or_default(conn, StoreKey::AiCache)?;
            let removed = match url {
                Some(url) => cache.remove(&url),
                None => std::mem::take(&mut cache).len(),
            };
            if removed > 0 {
                write_json(conn, StoreKey::AiCache, &cache)?;
            }
            Ok(removed)
        })
        .await
    }

    pub async fn set_ai_enabled(&self, enabled: bool) -> Result<()> {
        self.execute(move |conn| write_json(conn, StoreKey::AiEnabled, &enabled))
            .await
    }

    pub async fn set_ai_disabled_sites(&self, sites: Vec<String>) -> Result<()> {
        self.execute(move |conn| write_json(conn, StoreKey::AiDisabledSites, &sites))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_rule_edits() {
        let db = Database::in_memory().unwrap();
        db.set_url_rule("https://x.com/a".into(), Verdict::Productive)
            .await
            .unwrap();
        db.set_productive_channel("UC123".into(), true).await.unwrap();
        db.set_productive_subreddit("rust".into(), true).await.unwrap();
        db.set_ai_enabled(true).await.unwrap();

        let snapshot = db.rule_snapshot().await.unwrap();
        assert_eq!(snapshot.rules.urls["https://x.com/a"], Verdict::Productive);
        assert!(snapshot.rules.productive_channels.contains("UC123"));
        assert!(snapshot.rules.productive_subreddits.contains("rust"));
        assert!(snapshot.ai.enabled);

        db.set_productive_channel("UC123".into(), false).await.unwrap();
        assert!(db.user_rules().await.unwrap().productive_channels.is_empty());
    }

    #[tokio::test]
    async fn ai_cache_keeps_first_verdict_until_cleared() {
        let db = Database::in_memory().unwrap();
        assert_eq!(
            db.cache_ai_verdict("https://a.com".into(), Verdict::Distracting)
                .await
                .unwrap(),
            Verdict::Distracting
        );
        assert_eq!(
            db.cache_ai_verdict("https://a.com".into(), Verdict::Productive)
                .await
                .unwrap(),
            Verdict::Distracting
        );
        db.cache_ai_verdict("https://b.com".into(), Verdict::Productive)
            .await
            .unwrap();

        let cache = db.rule_snapshot().await.unwrap().cache;
        assert_eq!(cache.lookup("https://a.com"), Some(Verdict::Distracting));

        assert_eq!(db.clear_ai_cache(Some("https://a.com".into())).await.unwrap(), 1);
        assert_eq!(db.clear_ai_cache(None).await.unwrap(), 1);
        assert!(db.rule_snapshot().await.unwrap().cache.is_empty());
    }
}
