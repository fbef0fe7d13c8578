use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_ms;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TickerStatus {
    #[default]
    Stopped,
    Ticking,
}

/// Color band of the displayed value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Band {
    Default,
    Warn,
    Danger,
}

pub fn band(value_ms: u64, warn_ms: u64, danger_ms: u64) -> Band {
    if value_ms >= danger_ms {
        Band::Danger
    } else if value_ms >= warn_ms {
        Band::Warn
    } else {
        Band::Default
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerState {
    pub status: TickerStatus,
    /// Value shown while stopped, and the last frame while ticking.
    pub displayed_ms: u64,
    pub warn_ms: u64,
    pub danger_ms: u64,
    /// Value at `anchor`; combines with the wall clock to extrapolate.
    #[serde(skip)]
    baseline_ms: u64,
    #[serde(skip)]
    anchor: Option<DateTime<Utc>>,
    #[serde(skip)]
    applied_band: Option<Band>,
}

impl TickerState {
    pub fn new(warn_ms: u64, danger_ms: u64) -> Self {
        Self {
            status: TickerStatus::Stopped,
            displayed_ms: 0,
            warn_ms,
            danger_ms,
            baseline_ms: 0,
            anchor: None,
            applied_band: None,
        }
    }

    pub fn current_ms(&self, now: DateTime<Utc>) -> u64 {
        match (self.status, self.anchor) {
            (TickerStatus::Ticking, Some(anchor)) => {
                self.baseline_ms.saturating_add(elapsed_ms(anchor, now))
            }
            _ => self.displayed_ms,
        }
    }

    pub fn start(&mut self, duration_ms: u64, start_time: DateTime<Utc>) {
        self.status = TickerStatus::Ticking;
        self.baseline_ms = duration_ms;
        self.anchor = Some(start_time);
    }

    /// Freezes the display at its current value. False when already stopped.
    pub fn stop(&mut self, now: DateTime<Utc>) -> bool {
        if self.status == TickerStatus::Stopped {
            return false;
        }
        self.displayed_ms = self.current_ms(now);
        self.baseline_ms = self.displayed_ms;
        self.status = TickerStatus::Stopped;
        self.anchor = None;
        true
    }

    /// Sets the displayed value. `time_ms` is the total as of `now`, so while
    /// ticking the anchor moves to `now` and extrapolation carries on from there.
    pub fn update(&mut self, time_ms: u64, now: DateTime<Utc>) {
        self.baseline_ms = time_ms;
        match self.status {
            TickerStatus::Ticking => self.anchor = Some(now),
            TickerStatus::Stopped => self.displayed_ms = time_ms,
        }
    }

    pub fn set_thresholds(&mut self, warn_ms: u64, danger_ms: u64) {
        self.warn_ms = warn_ms;
        self.danger_ms = danger_ms;
        self.applied_band = None;
    }

    /// Computes the frame for `now`. Returns the band only when it differs
    /// from the one last applied.
    pub fn frame(&mut self, now: DateTime<Utc>) -> (u64, Option<Band>) {
        let value = self.current_ms(now);
        self.displayed_ms = value;
        let current = band(value, self.warn_ms, self.danger_ms);
        if self.applied_band == Some(current) {
            (value, None)
        } else {
            self.applied_band = Some(current);
            (value, Some(current))
        }
    }
}
