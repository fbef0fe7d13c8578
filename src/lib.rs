pub mod blocking;
pub mod bridge;
pub mod classify;
pub mod clock;
pub mod commands;
pub mod db;
pub mod error;
pub mod host;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod sites;
pub mod timer;
mod utils;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use blocking::BlockingGate;
use bridge::BrowserBridge;
use classify::{AiClassifier, Classifier};
use clock::{Clock, SystemClock};
use db::Database;
use host::{BridgeAiClassifier, Host, TabRegistry};
use log::{error, info, warn};
use session::{DailyResetAlarm, SessionCoordinator};
use settings::SettingsStore;
use sites::SiteSync;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Everything a UI request or browser event handler needs.
pub struct AppState {
    pub db: Database,
    pub coordinator: SessionCoordinator,
    pub classifier: Classifier,
    pub gate: BlockingGate,
    pub bridge: Arc<dyn BrowserBridge>,
    pub site_sync: SiteSync,
    pub clock: Arc<dyn Clock>,
    pub reset_hour: watch::Sender<u32>,
}

impl AppState {
    /// Spawns the coordinator, so this must run inside a tokio runtime.
    pub fn new(
        db: Database,
        bridge: Arc<dyn BrowserBridge>,
        ai: Arc<dyn AiClassifier>,
        clock: Arc<dyn Clock>,
        ai_timeout: Duration,
        reset_hour: u32,
    ) -> Self {
        let classifier = Classifier::new(db.clone(), ai, ai_timeout);
        let coordinator = SessionCoordinator::spawn(
            db.clone(),
            bridge.clone(),
            classifier.clone(),
            clock.clone(),
        );
        let (reset_hour, _) = watch::channel(reset_hour);

        Self {
            gate: BlockingGate::new(db.clone(), clock.clone()),
            site_sync: SiteSync::new(db.clone(), bridge.clone()),
            db,
            coordinator,
            classifier,
            bridge,
            clock,
            reset_hour,
        }
    }

    pub fn reset_alarm(&self) -> DailyResetAlarm {
        DailyResetAlarm::new(
            self.coordinator.clone(),
            self.db.clone(),
            self.clock.clone(),
            self.reset_hour.subscribe(),
        )
    }
}

fn data_dir() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os("TABTIME_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("tabtime"))
        .ok_or_else(|| anyhow!("no data directory for this platform; set TABTIME_DATA_DIR"))
}

async fn start() -> anyhow::Result<()> {
    let data_dir = data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create {}", data_dir.display()))?;

    let settings_path = data_dir.join("settings.json");
    let write_defaults = !settings_path.exists();
    let settings_store = SettingsStore::new(settings_path)?;
    if write_defaults {
        settings_store.update_host(settings_store.host())?;
    }
    let settings = settings_store.host();

    let database = Database::new(data_dir.join("tabtime.sqlite3"))?;

    // A session left by an earlier process was never observed ending.
    if let Some(stale) = database.discard_active_session().await? {
        warn!(
            "Discarded stale session on tab {} started at {}; its time is not counted",
            stale.tab_id, stale.start_time
        );
    }
    let reset_time = database
        .reset_time_or_seed(settings.default_reset_hour)
        .await?;

    let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity.max(1));
    let registry = Arc::new(TabRegistry::new(outbound_tx.clone()));
    let ai = Arc::new(BridgeAiClassifier::new(outbound_tx));

    let state = Arc::new(AppState::new(
        database,
        registry.clone(),
        ai.clone(),
        Arc::new(SystemClock),
        settings.ai_timeout(),
        reset_time.hour,
    ));

    let cancel = CancellationToken::new();
    let alarm = state.reset_alarm().spawn(cancel.clone());

    let host = Host::new(state, registry, ai);
    let result = host
        .serve(
            tokio::io::BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            outbound_rx,
        )
        .await;

    cancel.cancel();
    if let Err(err) = alarm.await {
        warn!("Reset alarm task ended abnormally: {err}");
    }
    result
}

pub fn run() {
    let debug = std::env::var("TABTIME_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    info!("tabtime starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("Failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(start()) {
        error!("tabtime stopped: {err:#}");
        std::process::exit(1);
    }
}
