//! Native-messaging style host: newline-delimited JSON on stdin and stdout.

pub mod ai;
pub mod envelope;
pub mod tabs;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    bridge::BrowserBridge,
    classify::PageMetadata,
    commands::handle_ui_request,
    protocol::{ClientMessage, TabDirective, TabId},
    AppState,
};

pub use ai::BridgeAiClassifier;
pub use envelope::{BrowserEvent, Inbound, Outbound};
pub use tabs::TabRegistry;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub struct Host {
    state: Arc<AppState>,
    registry: Arc<TabRegistry>,
    ai: Arc<BridgeAiClassifier>,
}

impl Host {
    pub fn new(state: Arc<AppState>, registry: Arc<TabRegistry>, ai: Arc<BridgeAiClassifier>) -> Self {
        Self {
            state,
            registry,
            ai,
        }
    }

    /// Reads envelopes until `input` closes, then folds any running session.
    pub async fn serve<R, W>(
        &self,
        input: R,
        output: W,
        outbound_rx: mpsc::Receiver<Outbound>,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let stop_writer = CancellationToken::new();
        let writer = spawn_writer(output, outbound_rx, stop_writer.clone());
        log_info!("Host ready");

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("failed to read from stdin")? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Inbound>(line) {
                Ok(message) => self.dispatch(message).await,
                Err(err) => log_warn!("Skipping malformed line: {err}"),
            }
        }

        log_info!("Input closed; stopping the active session");
        if let Err(err) = self.state.coordinator.request_active_tab(None).await {
            log_warn!("Could not fold the active session on shutdown: {err}");
        }
        stop_writer.cancel();
        if let Err(err) = writer.await {
            log_warn!("Writer task ended abnormally: {err}");
        }
        Ok(())
    }

    pub async fn dispatch(&self, message: Inbound) {
        match message {
            Inbound::Tab { tab_id, message } => self.on_client_message(tab_id, message).await,
            Inbound::Browser { event } => self.on_browser_event(event).await,
            Inbound::Ui {
                request_id,
                request,
            } => {
                let state = self.state.clone();
                let registry = self.registry.clone();
                // Spawned: CLASSIFY may wait on an aiResult this loop has yet to read.
                tokio::spawn(async move {
                    let response = handle_ui_request(&state, request).await;
                    if let Err(err) = registry
                        .send(Outbound::Ui {
                            request_id,
                            response,
                        })
                        .await
                    {
                        log_warn!("Could not deliver UI response: {err}");
                    }
                });
            }
            Inbound::AiResult {
                request_id,
                verdict,
            } => {
                if !self.ai.resolve(&request_id, verdict) {
                    log_debug!("AI result {request_id} arrived after its request ended");
                }
            }
        }
    }

    async fn on_client_message(&self, tab_id: TabId, message: ClientMessage) {
        match message {
            ClientMessage::TabFocus => {
                self.registry.set_focused(Some(tab_id));
                let _ = self.state.coordinator.submit(Some(tab_id));
            }
            ClientMessage::TabBlur => {
                if self.registry.blur(tab_id) {
                    let _ = self.state.coordinator.submit(None);
                }
            }
            ClientMessage::Ready => {
                match self.state.coordinator.snapshot().await {
                    Ok(snapshot) => {
                        let _ = self.state.bridge.send_to_tab(
                            tab_id,
                            TabDirective::UpdateFrame {
                                time: snapshot.total,
                            },
                        );
                    }
                    Err(err) => log_warn!("No snapshot for ready tab {tab_id}: {err}"),
                }
                self.resubmit_if_focused(tab_id);
            }
            ClientMessage::EvaluatePage { metadata } => self.evaluate(tab_id, metadata),
            ClientMessage::UrlOnlyEvaluate { url } => {
                self.evaluate(tab_id, PageMetadata::from_url(url))
            }
        }
    }

    /// Classification can wait on the AI, so it runs off the read loop.
    fn evaluate(&self, tab_id: TabId, metadata: PageMetadata) {
        self.registry.upsert(tab_id, metadata.url.clone());
        let state = self.state.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let decision = state.classifier.classify(&metadata).await;
            log_debug!(
                "Tab {tab_id} {} is {} ({:?})",
                metadata.url,
                decision.verdict,
                decision.source
            );
            state
                .coordinator
                .record_verdict(tab_id, &metadata.url, decision.verdict);
            if registry.focused_tab() == Some(tab_id) {
                let _ = state.coordinator.submit(Some(tab_id));
            }
        });
    }

    async fn on_browser_event(&self, event: BrowserEvent) {
        match event {
            BrowserEvent::TabActivated { tab_id, url } => {
                if let Some(url) = url {
                    self.registry.upsert(tab_id, url);
                }
                self.registry.set_focused(Some(tab_id));
                let _ = self.state.coordinator.submit(Some(tab_id));
            }
            BrowserEvent::TabUpdated { tab_id, url } => {
                self.registry.upsert(tab_id, url);
                self.resubmit_if_focused(tab_id);
            }
            BrowserEvent::TabRemoved { tab_id } => {
                let was_focused = self.registry.remove(tab_id);
                self.state.coordinator.forget_tab(tab_id);
                if was_focused {
                    let _ = self.state.coordinator.submit(None);
                }
            }
            BrowserEvent::WindowFocusChanged {
                focused,
                active_tab_id,
            } => {
                let candidate = if focused { active_tab_id } else { None };
                self.registry.set_focused(candidate);
                let _ = self.state.coordinator.submit(candidate);
            }
            BrowserEvent::PermissionsChanged { origins } => {
                self.registry.set_grants(origins);
                self.sync_sites().await;
            }
            BrowserEvent::ClientsSnapshot { hosts } => {
                self.registry.set_registered(hosts);
                self.sync_sites().await;
            }
        }
    }

    fn resubmit_if_focused(&self, tab_id: TabId) {
        if self.registry.focused_tab() == Some(tab_id) {
            let _ = self.state.coordinator.submit(Some(tab_id));
        }
    }

    async fn sync_sites(&self) {
        match self.state.site_sync.reconcile().await {
            Ok(report) if !report.pruned.is_empty() => {
                if let Some(focused) = self.registry.focused_tab() {
                    let _ = self.state.coordinator.submit(Some(focused));
                }
            }
            Ok(_) => {}
            Err(err) => log_warn!("Site sync failed: {err:#}"),
        }
    }
}

/// Writes queued messages one per line. Once `stop` fires, whatever is
/// already queued is still written before the task ends.
fn spawn_writer<W>(
    mut output: W,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    stop: CancellationToken,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                message = outbound_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
                _ = stop.cancelled() => {
                    while let Ok(message) = outbound_rx.try_recv() {
                        if write_line(&mut output, &message).await.is_err() {
                            break;
                        }
                    }
                    break;
                }
            };
            if write_line(&mut output, &message).await.is_err() {
                break;
            }
        }
    })
}

async fn write_line<W>(output: &mut W, message: &Outbound) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = match serde_json::to_string(message) {
        Ok(line) => line,
        Err(err) => {
            log_warn!("Could not encode outbound message: {err}");
            return Ok(());
        }
    };
    line.push('\n');
    let written = async {
        output.write_all(line.as_bytes()).await?;
        output.flush().await
    }
    .await;
    if let Err(err) = &written {
        log_warn!("Output closed: {err}");
    }
    written
}
