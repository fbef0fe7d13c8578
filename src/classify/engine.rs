use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use serde::Serialize;

use crate::{
    db::{
        models::{AiSettings, RuleSnapshot, UserRules},
        Database,
    },
    sites::hosts::{host_of, page_key, site_matches},
};

use super::{heuristics, AiClassifier, PageMetadata, Verdict};

/// Which layer produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    UserRule,
    Heuristic,
    AiCache,
    Ai,
    ChannelOverride,
    SubredditOverride,
    Default,
    /// AI or storage failed; distracting by policy.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub verdict: Verdict,
    pub source: Source,
}

impl Decision {
    fn new(verdict: Verdict, source: Source) -> Self {
        Self { verdict, source }
    }

    fn fallback() -> Self {
        Self::new(Verdict::Distracting, Source::Fallback)
    }
}

/// Result of the stored-state layers for one url.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Decided(Decision),
    /// AI applies and nothing is cached yet.
    AskAi,
}

/// Rule, heuristic and cache layers, in precedence order.
pub fn resolve(url: &str, snapshot: &RuleSnapshot) -> Resolution {
    if let Some(verdict) = snapshot.rules.urls.get(url) {
        return Resolution::Decided(Decision::new(*verdict, Source::UserRule));
    }

    if heuristics::is_short_form_video(url) {
        return Resolution::Decided(Decision::new(Verdict::Distracting, Source::Heuristic));
    }

    if ai_applies(url, &snapshot.ai) {
        return match snapshot.cache.lookup(url) {
            Some(verdict) => Resolution::Decided(Decision::new(verdict, Source::AiCache)),
            None => Resolution::AskAi,
        };
    }

    Resolution::Decided(Decision::new(Verdict::Distracting, Source::Default))
}

fn ai_applies(url: &str, ai: &AiSettings) -> bool {
    if !ai.enabled {
        return false;
    }
    match host_of(url) {
        Some(host) => !ai
            .disabled_sites
            .iter()
            .any(|site| site_matches(&host, site)),
        None => false,
    }
}

/// Channel and subreddit overrides. Only ever upgrades a page to productive.
///
/// A YouTube page counts as productive when either its channel id or its
/// channel name is listed; both identify the same channel.
pub fn platform_override(metadata: &PageMetadata, rules: &UserRules) -> Option<Decision> {
    let host = host_of(&metadata.url)?;

    if heuristics::is_youtube_host(&host) {
        let channel = metadata.youtube.as_ref()?;
        let listed = [&channel.channel_id, &channel.channel_name]
            .into_iter()
            .flatten()
            .any(|identifier| rules.productive_channels.contains(identifier));
        return listed.then(|| Decision::new(Verdict::Productive, Source::ChannelOverride));
    }

    if heuristics::is_reddit_host(&host) {
        let subreddit = metadata.reddit.as_ref()?.subreddit.as_ref()?;
        return rules
            .productive_subreddits
            .contains(subreddit)
            .then(|| Decision::new(Verdict::Productive, Source::SubredditOverride));
    }

    None
}

/// Classification entry point. Reads rule state from the store on every
/// call; the only write is populating the AI cache.
#[derive(Clone)]
pub struct Classifier {
    db: Database,
    ai: Arc<dyn AiClassifier>,
    ai_timeout: Duration,
}

impl Classifier {
    pub fn new(db: Database, ai: Arc<dyn AiClassifier>, ai_timeout: Duration) -> Self {
        Self { db, ai, ai_timeout }
    }

    pub async fn classify(&self, metadata: &PageMetadata) -> Decision {
        let snapshot = match self.db.rule_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Rule state unavailable, classifying {} as distracting: {err:#}", metadata.url);
                return Decision::fallback();
            }
        };

        // An override makes the page productive whatever the url layers say,
        // so there is no point paying for an AI call first.
        if let Some(decision) = platform_override(metadata, &snapshot.rules) {
            return decision;
        }

        let key = page_key(&metadata.url);
        match resolve(&key, &snapshot) {
            Resolution::Decided(decision) => decision,
            Resolution::AskAi => self.ask_ai(key, metadata).await,
        }
    }

    /// Stored layers only; an uncached AI-eligible url is distracting.
    pub async fn classify_offline(&self, url: &str) -> Decision {
        let snapshot = match self.db.rule_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Rule state unavailable, classifying {url} as distracting: {err:#}");
                return Decision::fallback();
            }
        };

        match resolve(&page_key(url), &snapshot) {
            Resolution::Decided(decision) => decision,
            Resolution::AskAi => Decision::new(Verdict::Distracting, Source::Default),
        }
    }

    async fn ask_ai(&self, key: String, metadata: &PageMetadata) -> Decision {
        let verdict = match tokio::time::timeout(self.ai_timeout, self.ai.classify(metadata)).await
        {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                warn!("AI classification failed for {key}: {err:#}");
                return Decision::fallback();
            }
            Err(_) => {
                warn!(
                    "AI classification timed out after {}ms for {key}",
                    self.ai_timeout.as_millis()
                );
                return Decision::fallback();
            }
        };

        match self.db.cache_ai_verdict(key.clone(), verdict).await {
            Ok(stored) => {
                debug!("AI verdict for {key}: {stored}");
                Decision::new(stored, Source::Ai)
            }
            Err(err) => {
                warn!("Failed to cache AI verdict for {key}: {err:#}");
                Decision::new(verdict, Source::Ai)
            }
        }
    }
}
