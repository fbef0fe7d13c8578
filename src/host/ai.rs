use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::classify::{AiClassifier, AiFuture, PageMetadata, Verdict};

use super::envelope::Outbound;

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Option<Verdict>>>>>;

/// AI classifier that delegates to the browser side: each call writes an
/// `aiRequest` line and waits for the matching `aiResult`.
pub struct BridgeAiClassifier {
    outbound: mpsc::Sender<Outbound>,
    pending: Pending,
}

impl BridgeAiClassifier {
    pub fn new(outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Hands a result to its waiting call. False when nobody is waiting,
    /// e.g. because the call already timed out.
    pub fn resolve(&self, request_id: &str, verdict: Option<Verdict>) -> bool {
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id);
        match waiter {
            Some(tx) => tx.send(verdict).is_ok(),
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Removes the pending entry however the call ends, including cancellation
/// by the caller's timeout.
struct PendingGuard {
    pending: Pending,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.request_id);
    }
}

impl AiClassifier for BridgeAiClassifier {
    fn classify<'a>(&'a self, metadata: &'a PageMetadata) -> AiFuture<'a> {
        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let (tx, rx) = oneshot::channel();
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(request_id.clone(), tx);
            let _guard = PendingGuard {
                pending: self.pending.clone(),
                request_id: request_id.clone(),
            };

            self.outbound
                .try_send(Outbound::AiRequest {
                    request_id,
                    metadata: metadata.clone(),
                })
                .map_err(|err| anyhow!("could not queue AI request: {err}"))?;

            match rx.await {
                Ok(Some(verdict)) => Ok(verdict),
                Ok(None) => Err(anyhow!("AI returned no verdict")),
                Err(_) => Err(anyhow!("AI request abandoned")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn round_trips_through_outbound_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let ai = Arc::new(BridgeAiClassifier::new(tx));

        let responder = {
            let ai = ai.clone();
            tokio::spawn(async move {
                match rx.recv().await {
                    Some(Outbound::AiRequest { request_id, metadata }) => {
                        assert_eq!(metadata.url, "https://docs.rs/");
                        assert!(ai.resolve(&request_id, Some(Verdict::Productive)));
                    }
                    other => panic!("unexpected outbound {other:?}"),
                }
            })
        };

        let verdict = ai
            .classify(&PageMetadata::from_url("https://docs.rs/"))
            .await
            .unwrap();
        assert_eq!(verdict, Verdict::Productive);
        responder.await.unwrap();
        assert_eq!(ai.in_flight(), 0);
    }

    #[tokio::test]
    async fn timed_out_call_leaves_nothing_pending() {
        let (tx, _rx) = mpsc::channel(4);
        let ai = BridgeAiClassifier::new(tx);
        let page = PageMetadata::from_url("https://docs.rs/");

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), ai.classify(&page)).await;
        assert!(outcome.is_err());
        assert_eq!(ai.in_flight(), 0);
        assert!(!ai.resolve("late", Some(Verdict::Distracting)));
    }

    #[tokio::test]
    async fn null_verdict_is_an_error() {
        let (tx, mut rx) = mpsc::channel(4);
        let ai = Arc::new(BridgeAiClassifier::new(tx));
        let resolver = ai.clone();
        tokio::spawn(async move {
            if let Some(Outbound::AiRequest { request_id, .. }) = rx.recv().await {
                resolver.resolve(&request_id, None);
            }
        });

        let page = PageMetadata::from_url("https://docs.rs/");
        assert!(ai.classify(&page).await.is_err());
    }
}
