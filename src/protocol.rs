//! Message families exchanged between tabs, the UI and the coordinator.
//!
//! Every family is a closed enum tagged by `type`; durations are integer
//! milliseconds and timestamps are epoch milliseconds on the wire.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    classify::{PageMetadata, Verdict},
    db::models::{BlockingSettings, OverlayConfig},
    error::{ErrorCode, TrackerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Render client → coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    TabFocus,
    TabBlur,
    Ready,
    EvaluatePage { metadata: PageMetadata },
    UrlOnlyEvaluate { url: String },
}

/// Coordinator → render client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum TabDirective {
    StartTicking {
        starting_duration: u64,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        start_time: DateTime<Utc>,
    },
    StopTicking,
    UpdateFrame {
        time: u64,
    },
    ActivateOverlay,
    DeactivateOverlay,
    ReInitializeOverlay,
}

/// UI → coordinator, answered with a [`UiResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum UiRequest {
    AddSite {
        site: String,
    },
    RemoveSite {
        site: String,
    },
    MarkDistracting {
        url: String,
    },
    MarkProductive {
        url: String,
    },
    GetDailyTime,
    IsBlocked {
        url: String,
    },
    Classify {
        metadata: PageMetadata,
    },
    RevalidateAi {
        #[serde(default)]
        url: Option<String>,
    },
    SetProductiveChannel {
        channel: String,
        productive: bool,
    },
    SetProductiveSubreddit {
        subreddit: String,
        productive: bool,
    },
    SetAiEnabled {
        enabled: bool,
    },
    SetAiDisabledSites {
        sites: Vec<String>,
    },
    UpdateBlockingSettings {
        settings: BlockingSettings,
    },
    SetGracePeriod {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        until: DateTime<Utc>,
    },
    ClearGracePeriod,
    SetOverlayConfig {
        config: OverlayConfig,
    },
    SetOverlayVisible {
        visible: bool,
    },
    SetResetTime {
        hour: u32,
    },
    GetHistory {
        #[serde(default = "default_history_days")]
        days: u32,
    },
}

fn default_history_days() -> u32 {
    7
}

impl UiRequest {
    pub fn name(&self) -> &'static str {
        match self {
            UiRequest::AddSite { .. } => "ADD_SITE",
            UiRequest::RemoveSite { .. } => "REMOVE_SITE",
            UiRequest::MarkDistracting { .. } => "MARK_DISTRACTING",
            UiRequest::MarkProductive { .. } => "MARK_PRODUCTIVE",
            UiRequest::GetDailyTime => "GET_DAILY_TIME",
            UiRequest::IsBlocked { .. } => "IS_BLOCKED",
            UiRequest::Classify { .. } => "CLASSIFY",
            UiRequest::RevalidateAi { .. } => "REVALIDATE_AI",
            UiRequest::SetProductiveChannel { .. } => "SET_PRODUCTIVE_CHANNEL",
            UiRequest::SetProductiveSubreddit { .. } => "SET_PRODUCTIVE_SUBREDDIT",
            UiRequest::SetAiEnabled { .. } => "SET_AI_ENABLED",
            UiRequest::SetAiDisabledSites { .. } => "SET_AI_DISABLED_SITES",
            UiRequest::UpdateBlockingSettings { .. } => "UPDATE_BLOCKING_SETTINGS",
            UiRequest::SetGracePeriod { .. } => "SET_GRACE_PERIOD",
            UiRequest::ClearGracePeriod => "CLEAR_GRACE_PERIOD",
            UiRequest::SetOverlayConfig { .. } => "SET_OVERLAY_CONFIG",
            UiRequest::SetOverlayVisible { .. } => "SET_OVERLAY_VISIBLE",
            UiRequest::SetResetTime { .. } => "SET_RESET_TIME",
            UiRequest::GetHistory { .. } => "GET_HISTORY",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiResponse {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}

impl UiResponse {
    pub fn ok() -> Self {
        UiResponse::Success { data: None }
    }

    pub fn with_data<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => UiResponse::Success { data: Some(value) },
            Err(err) => UiResponse::Error {
                code: ErrorCode::InvalidInput,
                message: format!("failed to encode response: {err}"),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UiResponse::Success { .. })
    }
}

impl From<TrackerError> for UiResponse {
    fn from(err: TrackerError) -> Self {
        UiResponse::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Verdict reply for `CLASSIFY`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyReply {
    pub url: String,
    pub verdict: Verdict,
}
