use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

/// Process-level tuning; everything the UI edits lives in the store instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HostSettings {
    pub ai_timeout_ms: u64,
    /// Capacity of the queue of messages waiting to be written to the browser.
    pub outbound_capacity: usize,
    /// Reset hour used until the UI stores one.
    pub default_reset_hour: u32,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            ai_timeout_ms: 8_000,
            outbound_capacity: 256,
            default_reset_hour: 0,
        }
    }
}

impl HostSettings {
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    host: HostSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn host(&self) -> HostSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .host
            .clone()
    }

    pub fn update_host(&self, settings: HostSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.host = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
