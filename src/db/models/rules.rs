//! Classification rule state: explicit user rules and the AI verdict cache.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::classify::Verdict;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRules {
    #[serde(default)]
    pub urls: BTreeMap<String, Verdict>,
    #[serde(default)]
    pub productive_channels: BTreeSet<String>,
    #[serde(default)]
    pub productive_subreddits: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiCacheEntry {
    pub url: String,
    pub verdict: Verdict,
}

/// Append-only list of AI verdicts; the first entry for a url wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AiCache(pub Vec<AiCacheEntry>);

impl AiCache {
    pub fn lookup(&self, url: &str) -> Option<Verdict> {
        self.0
            .iter()
            .find(|entry| entry.url == url)
            .map(|entry| entry.verdict)
    }

    /// Returns false when a verdict for `url` already exists.
    pub fn insert_if_absent(&mut self, url: &str, verdict: Verdict) -> bool {
        if self.lookup(url).is_some() {
            return false;
        }
        self.0.push(AiCacheEntry {
            url: url.to_string(),
            verdict,
        });
        true
    }

    /// Drops every entry for `url`; returns how many were removed.
    pub fn remove(&mut self, url: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|entry| entry.url != url);
        before - self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// AI switches read together with the cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiSettings {
    pub enabled: bool,
    pub disabled_sites: Vec<String>,
}

/// Snapshot of everything classification reads, taken in one store task.
#[derive(Debug, Clone, Default)]
pub struct RuleSnapshot {
    pub rules: UserRules,
    pub cache: AiCache,
    pub ai: AiSettings,
}
