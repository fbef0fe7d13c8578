//! Page classification: explicit rules, url heuristics, cached and live AI
//! verdicts, then a distracting default.

pub mod ai;
pub mod engine;
pub mod heuristics;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use ai::{AiClassifier, AiFuture, NoAiClassifier};
pub use engine::{Classifier, Decision, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Productive,
    Distracting,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Productive => "productive",
            Verdict::Distracting => "distracting",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YouTubeMetadata {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedditMetadata {
    #[serde(default)]
    pub subreddit: Option<String>,
}

/// What a render client scraped from its page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube: Option<YouTubeMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reddit: Option<RedditMetadata>,
}

impl PageMetadata {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}
