//! UI request handlers.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::json;

use crate::{
    classify::{PageMetadata, Verdict},
    db::models::{
        validation::{validate_blocking, validate_overlay, validate_reset_hour},
        BlockingSettings, DailyTotal, OverlayConfig, ResetTime,
    },
    error::{TrackerError, TrackerResult},
    protocol::{ClassifyReply, TabDirective, TabId, UiRequest, UiResponse},
    session::LedgerSnapshot,
    sites::{
        hosts::{host_of, normalize_page_url, normalize_site, page_key, site_matches},
        is_granted,
    },
    AppState,
};

/// Runs one UI request to completion and folds the outcome into a response.
pub async fn handle_ui_request(state: &AppState, request: UiRequest) -> UiResponse {
    let name = request.name();
    let result = dispatch(state, request).await;
    match result {
        Ok(response) => response,
        Err(err) => {
            debug!("{name} rejected: {err}");
            UiResponse::from(err)
        }
    }
}

async fn dispatch(state: &AppState, request: UiRequest) -> TrackerResult<UiResponse> {
    match request {
        UiRequest::AddSite { site } => Ok(UiResponse::with_data(&add_site(state, site).await?)),
        UiRequest::RemoveSite { site } => {
            Ok(UiResponse::with_data(&remove_site(state, site).await?))
        }
        UiRequest::MarkDistracting { url } => {
            mark_url(state, url, Verdict::Distracting).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::MarkProductive { url } => {
            mark_url(state, url, Verdict::Productive).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::GetDailyTime => Ok(UiResponse::with_data(&get_daily_time(state).await?)),
        UiRequest::IsBlocked { url } => {
            let blocked = state.gate.check(&url).await?;
            Ok(UiResponse::with_data(&blocked))
        }
        UiRequest::Classify { metadata } => Ok(UiResponse::with_data(&classify(state, metadata).await)),
        UiRequest::RevalidateAi { url } => {
            let removed = revalidate_ai(state, url).await?;
            Ok(UiResponse::with_data(&json!({ "removed": removed })))
        }
        UiRequest::SetProductiveChannel {
            channel,
            productive,
        } => {
            set_productive_channel(state, channel, productive).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::SetProductiveSubreddit {
            subreddit,
            productive,
        } => {
            set_productive_subreddit(state, subreddit, productive).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::SetAiEnabled { enabled } => {
            state.db.set_ai_enabled(enabled).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::SetAiDisabledSites { sites } => {
            set_ai_disabled_sites(state, sites).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::UpdateBlockingSettings { settings } => {
            update_blocking_settings(state, settings).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::SetGracePeriod { until } => {
            Ok(UiResponse::with_data(&set_grace_period(state, until).await?))
        }
        UiRequest::ClearGracePeriod => Ok(UiResponse::with_data(
            &set_grace_period(state, DateTime::<Utc>::UNIX_EPOCH).await?,
        )),
        UiRequest::SetOverlayConfig { config } => {
            set_overlay_config(state, config).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::SetOverlayVisible { visible } => Ok(UiResponse::with_data(
            &set_overlay_visible(state, visible).await?,
        )),
        UiRequest::SetResetTime { hour } => {
            set_reset_time(state, hour).await?;
            Ok(UiResponse::ok())
        }
        UiRequest::GetHistory { days } => Ok(UiResponse::with_data(&get_history(state, days).await?)),
    }
}

pub async fn add_site(state: &AppState, site: String) -> TrackerResult<Vec<String>> {
    let site = normalize_site(&site)?;

    let tracked = state.db.tracked_sites().await?;
    if tracked.contains(&site) {
        return Err(TrackerError::AlreadyTracked(site));
    }
    if let Some(origins) = state.bridge.granted_origins() {
        if !is_granted(&site, &origins) {
            return Err(TrackerError::PermissionDenied(site));
        }
    }

    let sites = state.db.add_tracked_site(site.clone()).await?;
    sync_sites(state).await;
    notify_tabs_on(state, &site, TabDirective::ActivateOverlay);
    resubmit_focused(state).await;
    Ok(sites)
}

pub async fn remove_site(state: &AppState, site: String) -> TrackerResult<Vec<String>> {
    let site = normalize_site(&site)?;
    let sites = state.db.remove_tracked_site(site.clone()).await?;
    sync_sites(state).await;
    notify_tabs_on(state, &site, TabDirective::DeactivateOverlay);
    resubmit_focused(state).await;
    Ok(sites)
}

pub async fn mark_url(state: &AppState, url: String, verdict: Verdict) -> TrackerResult<()> {
    let url = normalize_page_url(&url)?;
    state.db.set_url_rule(url.clone(), verdict).await?;

    for tab in state.bridge.tabs() {
        if page_key(&tab.url) == url {
            state.coordinator.record_verdict(tab.tab_id, &tab.url, verdict);
            notify(state, tab.tab_id, TabDirective::ReInitializeOverlay);
        }
    }
    resubmit_focused(state).await;
    Ok(())
}

pub async fn get_daily_time(state: &AppState) -> TrackerResult<LedgerSnapshot> {
    state.coordinator.snapshot().await
}

pub async fn classify(state: &AppState, metadata: PageMetadata) -> ClassifyReply {
    let decision = state.classifier.classify(&metadata).await;
    ClassifyReply {
        url: metadata.url,
        verdict: decision.verdict,
    }
}

pub async fn revalidate_ai(state: &AppState, url: Option<String>) -> TrackerResult<usize> {
    let key = url.as_deref().map(page_key);
    Ok(state.db.clear_ai_cache(key).await?)
}

pub async fn set_productive_channel(
    state: &AppState,
    channel: String,
    productive: bool,
) -> TrackerResult<()> {
    let channel = non_empty(channel, "channel")?;
    state.db.set_productive_channel(channel, productive).await?;
    reinitialize_tracked_tabs(state).await?;
    resubmit_focused(state).await;
    Ok(())
}

pub async fn set_productive_subreddit(
    state: &AppState,
    subreddit: String,
    productive: bool,
) -> TrackerResult<()> {
    let subreddit = non_empty(subreddit, "subreddit")?;
    let subreddit = subreddit.trim_start_matches("r/").to_string();
    state.db.set_productive_subreddit(subreddit, productive).await?;
    reinitialize_tracked_tabs(state).await?;
    resubmit_focused(state).await;
    Ok(())
}

pub async fn set_ai_disabled_sites(state: &AppState, sites: Vec<String>) -> TrackerResult<()> {
    let sites = sites
        .iter()
        .map(|site| normalize_site(site))
        .collect::<TrackerResult<Vec<_>>>()?;
    state.db.set_ai_disabled_sites(sites).await?;
    Ok(())
}

pub async fn update_blocking_settings(
    state: &AppState,
    settings: BlockingSettings,
) -> TrackerResult<()> {
    validate_blocking(&settings)?;
    state.db.set_blocking_settings(settings).await?;
    resubmit_focused(state).await;
    Ok(())
}

pub async fn set_grace_period(
    state: &AppState,
    until: DateTime<Utc>,
) -> TrackerResult<BlockingSettings> {
    let settings = state.db.set_grace_period_until(until).await?;
    resubmit_focused(state).await;
    Ok(settings)
}

pub async fn set_overlay_config(state: &AppState, config: OverlayConfig) -> TrackerResult<()> {
    validate_overlay(&config)?;
    state.db.set_overlay_config(config).await?;
    reinitialize_tracked_tabs(state).await?;
    Ok(())
}

pub async fn set_overlay_visible(state: &AppState, visible: bool) -> TrackerResult<OverlayConfig> {
    let config = state.db.set_overlay_visible(visible).await?;
    let snapshot = state.coordinator.snapshot().await?;
    let toggle = if visible {
        TabDirective::ActivateOverlay
    } else {
        TabDirective::DeactivateOverlay
    };

    for tab_id in tracked_tabs(state).await? {
        notify(state, tab_id, toggle.clone());
        notify(
            state,
            tab_id,
            TabDirective::UpdateFrame {
                time: snapshot.total,
            },
        );
    }
    Ok(config)
}

pub async fn set_reset_time(state: &AppState, hour: u32) -> TrackerResult<()> {
    validate_reset_hour(hour)?;
    state.db.set_reset_time(ResetTime { hour }).await?;
    state.reset_hour.send_replace(hour);
    Ok(())
}

pub async fn get_history(state: &AppState, days: u32) -> TrackerResult<Vec<DailyTotal>> {
    Ok(state.db.daily_history(days.max(1)).await?)
}

fn non_empty(value: String, field: &str) -> TrackerResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::invalid(format!("{field} is empty")));
    }
    Ok(trimmed.to_string())
}

async fn sync_sites(state: &AppState) {
    if let Err(err) = state.site_sync.reconcile().await {
        warn!("Site sync failed: {err:#}");
    }
}

async fn resubmit_focused(state: &AppState) {
    let Some(tab_id) = state.bridge.focused_tab() else {
        return;
    };
    if let Err(err) = state.coordinator.request_active_tab(Some(tab_id)).await {
        warn!("Resubmitting focused tab {tab_id} failed: {err}");
    }
}

fn notify(state: &AppState, tab_id: TabId, directive: TabDirective) {
    if let Err(err) = state.bridge.send_to_tab(tab_id, directive) {
        debug!("Dropped directive for tab {tab_id}: {err}");
    }
}

fn notify_tabs_on(state: &AppState, site: &str, directive: TabDirective) {
    for tab in state.bridge.tabs() {
        if host_of(&tab.url).is_some_and(|host| site_matches(&host, site)) {
            notify(state, tab.tab_id, directive.clone());
        }
    }
}

async fn tracked_tabs(state: &AppState) -> TrackerResult<Vec<TabId>> {
    let tracked = state.db.tracked_sites().await?;
    Ok(state
        .bridge
        .tabs()
        .into_iter()
        .filter(|tab| {
            host_of(&tab.url)
                .is_some_and(|host| tracked.iter().any(|site| site_matches(&host, site)))
        })
        .map(|tab| tab.tab_id)
        .collect())
}

async fn reinitialize_tracked_tabs(state: &AppState) -> TrackerResult<()> {
    for tab_id in tracked_tabs(state).await? {
        notify(state, tab_id, TabDirective::ReInitializeOverlay);
    }
    Ok(())
}
