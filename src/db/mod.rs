//! SQLite-backed key/value store over a fixed schema of keys.
//!
//! Typed accessors for each slice live in `repositories`; each accessor runs
//! as a single task on the store thread, so its read-modify-write cannot
//! interleave with another accessor's.

mod connection;
pub mod helpers;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    DailyTime,
    ActiveSession,
    OverlayConfig,
    TrackedSites,
    UserRules,
    AiCache,
    AiEnabled,
    AiDisabledSites,
    BlockingSettings,
    ResetTime,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::DailyTime => "dailyTime",
            StoreKey::ActiveSession => "activeSession",
            StoreKey::OverlayConfig => "overlayConfig",
            StoreKey::TrackedSites => "trackedSites",
            StoreKey::UserRules => "userRules",
            StoreKey::AiCache => "aiCache",
            StoreKey::AiEnabled => "aiEnabled",
            StoreKey::AiDisabledSites => "aiDisabledSites",
            StoreKey::BlockingSettings => "blockingSettings",
            StoreKey::ResetTime => "resetTime",
        }
    }
}
