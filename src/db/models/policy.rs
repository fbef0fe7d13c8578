//! Policy and presentation models owned by the UI.
//!
//! The coordinator only ever reads these. `OverlayConfig` keeps any field it
//! does not know about so a newer UI can store presentation state here
//! without this crate dropping it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_TIME_LIMIT_MS: u64 = 60 * 60 * 1000;
const DEFAULT_WARN_MS: u64 = 30 * 60 * 1000;
const DEFAULT_DANGER_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockingSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Daily allowance in milliseconds.
    #[serde(default = "default_time_limit")]
    pub time_limit: u64,
    #[serde(
        default = "epoch",
        with = "chrono::serde::ts_milliseconds"
    )]
    pub grace_period_until: DateTime<Utc>,
    #[serde(default)]
    pub url_exceptions: Vec<String>,
}

fn default_time_limit() -> u64 {
    DEFAULT_TIME_LIMIT_MS
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl Default for BlockingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            time_limit: DEFAULT_TIME_LIMIT_MS,
            grace_period_until: epoch(),
            url_exceptions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BandColors {
    pub default: String,
    pub warn: String,
    pub danger: String,
}

impl Default for BandColors {
    fn default() -> Self {
        Self {
            default: "#1F2937".into(),
            warn: "#D97706".into(),
            danger: "#DC2626".into(),
        }
    }
}

/// Per-host geometry is opaque to this crate.
pub type HostGeometry = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverlayConfig {
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_warn")]
    pub warn_threshold: u64,
    #[serde(default = "default_danger")]
    pub danger_threshold: u64,
    #[serde(default)]
    pub colors: BandColors,
    #[serde(default)]
    pub positions: HostGeometry,
    #[serde(default)]
    pub sizes: HostGeometry,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_visible() -> bool {
    true
}

fn default_warn() -> u64 {
    DEFAULT_WARN_MS
}

fn default_danger() -> u64 {
    DEFAULT_DANGER_MS
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            visible: true,
            warn_threshold: DEFAULT_WARN_MS,
            danger_threshold: DEFAULT_DANGER_MS,
            colors: BandColors::default(),
            positions: HostGeometry::new(),
            sizes: HostGeometry::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Local hour at which the daily total rolls over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResetTime {
    pub hour: u32,
}

/// Validation for UI-supplied policy data.
pub mod validation {
    use super::{BlockingSettings, OverlayConfig};
    use crate::error::{TrackerError, TrackerResult};

    const MAX_EXCEPTION_LEN: usize = 2_048;
    const MAX_EXCEPTIONS: usize = 500;

    pub fn validate_color(color: &str) -> TrackerResult<()> {
        let Some(hex_part) = color.strip_prefix('#') else {
            return Err(TrackerError::invalid(format!(
                "color {color:?} must be hex (#RRGGBB)"
            )));
        };

        if hex_part.len() != 6 && hex_part.len() != 8 {
            return Err(TrackerError::invalid(format!(
                "color {color:?} must be #RRGGBB or #RRGGBBAA"
            )));
        }

        if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TrackerError::invalid(format!(
                "color {color:?} must be hex (#RRGGBB)"
            )));
        }

        Ok(())
    }

    /// Exceptions are substring patterns, so anything printable without
    /// whitespace is accepted.
    pub fn validate_exception(pattern: &str) -> TrackerResult<()> {
        if pattern.trim().is_empty() {
            return Err(TrackerError::invalid("exception pattern is empty"));
        }
        if pattern.len() > MAX_EXCEPTION_LEN {
            return Err(TrackerError::invalid("exception pattern is too long"));
        }
        if pattern.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(TrackerError::invalid(format!(
                "exception pattern {pattern:?} contains whitespace"
            )));
        }
        Ok(())
    }

    pub fn validate_blocking(settings: &BlockingSettings) -> TrackerResult<()> {
        if settings.url_exceptions.len() > MAX_EXCEPTIONS {
            return Err(TrackerError::invalid("too many url exceptions"));
        }
        for pattern in &settings.url_exceptions {
            validate_exception(pattern)?;
        }
        Ok(())
    }

    pub fn validate_overlay(config: &OverlayConfig) -> TrackerResult<()> {
        if config.warn_threshold > config.danger_threshold {
            return Err(TrackerError::invalid(
                "warn threshold must not exceed danger threshold",
            ));
        }
        validate_color(&config.colors.default)?;
        validate_color(&config.colors.warn)?;
        validate_color(&config.colors.danger)?;
        Ok(())
    }

    pub fn validate_reset_hour(hour: u32) -> TrackerResult<()> {
        if hour > 23 {
            return Err(TrackerError::invalid(format!(
                "reset hour {hour} is outside 0-23"
            )));
        }
        Ok(())
    }
}
