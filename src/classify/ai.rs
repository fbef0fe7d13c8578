//! Seam to the external AI classifier.

use std::{future::Future, pin::Pin};

use anyhow::anyhow;

use super::{PageMetadata, Verdict};

pub type AiFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Verdict>> + Send + 'a>>;

/// Produces a verdict for a page. Callers bound the call with a timeout and
/// treat any error as distracting.
pub trait AiClassifier: Send + Sync {
    fn classify<'a>(&'a self, metadata: &'a PageMetadata) -> AiFuture<'a>;
}

/// Used when no AI backend is wired up; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAiClassifier;

impl AiClassifier for NoAiClassifier {
    fn classify<'a>(&'a self, _metadata: &'a PageMetadata) -> AiFuture<'a> {
        Box::pin(async { Err(anyhow!("no AI classifier configured")) })
    }
}
