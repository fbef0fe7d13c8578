use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::{clock::Clock, db::models::OverlayConfig, protocol::TabDirective};

use super::{Band, TickerState, TickerStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayChange {
    Activate,
    Deactivate,
    ReInitialize,
}

/// Where a render client draws. Implementations must be cheap; `render` is
/// called every frame while ticking.
pub trait FrameSink: Send + Sync + 'static {
    fn render(&self, value_ms: u64);

    /// Called only when the band differs from the last one applied.
    fn apply_band(&self, band: Band);

    fn overlay(&self, change: OverlayChange);
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Per-tab clock display that extrapolates locally from the last
/// `START_TICKING` snapshot instead of polling the coordinator.
#[derive(Clone)]
pub struct RenderClient {
    state: Arc<Mutex<TickerState>>,
    sink: Arc<dyn FrameSink>,
    clock: Arc<dyn Clock>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    frame_interval: Duration,
}

impl RenderClient {
    pub fn new(
        sink: Arc<dyn FrameSink>,
        clock: Arc<dyn Clock>,
        overlay: &OverlayConfig,
        frame_interval: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TickerState::new(
                overlay.warn_threshold,
                overlay.danger_threshold,
            ))),
            sink,
            clock,
            ticker: Arc::new(Mutex::new(None)),
            frame_interval,
        }
    }

    pub async fn handle(&self, directive: TabDirective) {
        match directive {
            TabDirective::StartTicking {
                starting_duration,
                start_time,
            } => self.start(starting_duration, start_time).await,
            TabDirective::StopTicking => self.stop().await,
            TabDirective::UpdateFrame { time } => self.update(time).await,
            TabDirective::ActivateOverlay => self.sink.overlay(OverlayChange::Activate),
            TabDirective::DeactivateOverlay => self.sink.overlay(OverlayChange::Deactivate),
            TabDirective::ReInitializeOverlay => self.sink.overlay(OverlayChange::ReInitialize),
        }
    }

    /// Restarts extrapolation from `duration_ms` at `start_time`, replacing
    /// any loop already running.
    pub async fn start(&self, duration_ms: u64, start_time: DateTime<Utc>) {
        self.cancel_ticker().await;
        {
            let mut state = self.state.lock().await;
            state.start(duration_ms, start_time);
            render_frame(&mut state, self.sink.as_ref(), self.clock.now());
        }
        self.spawn_ticker().await;
    }

    pub async fn stop(&self) {
        let stopped = {
            let mut state = self.state.lock().await;
            let stopped = state.stop(self.clock.now());
            if stopped {
                render_frame(&mut state, self.sink.as_ref(), self.clock.now());
            }
            stopped
        };
        if stopped {
            self.cancel_ticker().await;
        }
    }

    /// Applies `time_ms` once. Never starts a loop.
    pub async fn update(&self, time_ms: u64) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.update(time_ms, now);
        render_frame(&mut state, self.sink.as_ref(), now);
    }

    /// New thresholds take effect on the next frame, which re-applies the band.
    pub async fn reconfigure(&self, overlay: &OverlayConfig) {
        let mut state = self.state.lock().await;
        state.set_thresholds(overlay.warn_threshold, overlay.danger_threshold);
        render_frame(&mut state, self.sink.as_ref(), self.clock.now());
    }

    pub async fn status(&self) -> TickerStatus {
        self.state.lock().await.status
    }

    pub async fn current_ms(&self) -> u64 {
        let now = self.clock.now();
        self.state.lock().await.current_ms(now)
    }

    pub async fn is_looping(&self) -> bool {
        self.ticker
            .lock()
            .await
            .as_ref()
            .is_some_and(|ticker| !ticker.handle.is_finished())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            previous.cancel.cancel();
            previous.handle.abort();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let state = self.state.clone();
        let sink = self.sink.clone();
        let clock = self.clock.clone();
        let frame_interval = self.frame_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(frame_interval);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let mut guard = state.lock().await;
                        if guard.status != TickerStatus::Ticking {
                            break;
                        }
                        render_frame(&mut guard, sink.as_ref(), clock.now());
                    }
                }
            }
        });

        *ticker_guard = Some(Ticker { handle, cancel });
    }

    async fn cancel_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.cancel.cancel();
            ticker.handle.abort();
        }
    }
}

fn render_frame(state: &mut TickerState, sink: &dyn FrameSink, now: DateTime<Utc>) {
    let (value, band_change) = state.frame(now);
    if let Some(band) = band_change {
        sink.apply_band(band);
    }
    sink.render(value);
}
