//! Url patterns recognised without consulting any stored state.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Short-form Video Paths
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_YOUTUBE_SHORTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(?:www\.|m\.)?youtube\.com/shorts(?:/|$)").unwrap());
pub static RE_INSTAGRAM_REELS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(?:www\.)?instagram\.com/reels?(?:/|$)").unwrap());
pub static RE_FACEBOOK_REELS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(?:www\.|m\.)?facebook\.com/reels?(?:/|$)").unwrap());
pub static RE_TIKTOK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://(?:www\.|m\.)?tiktok\.com(?:/|$)").unwrap());

// ═══════════════════════════════════════════════════════════════════════════════
// Platform Hosts
// ═══════════════════════════════════════════════════════════════════════════════

pub static RE_YOUTUBE_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:[a-z0-9-]+\.)*youtube\.com|youtu\.be)$").unwrap());
pub static RE_REDDIT_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z0-9-]+\.)*reddit\.com$").unwrap());

pub fn is_short_form_video(url: &str) -> bool {
    [
        &*RE_YOUTUBE_SHORTS,
        &*RE_INSTAGRAM_REELS,
        &*RE_FACEBOOK_REELS,
        &*RE_TIKTOK,
    ]
    .iter()
    .any(|pattern| pattern.is_match(url))
}

pub fn is_youtube_host(host: &str) -> bool {
    RE_YOUTUBE_HOST.is_match(host)
}

pub fn is_reddit_host(host: &str) -> bool {
    RE_REDDIT_HOST.is_match(host)
}
