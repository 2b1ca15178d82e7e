//! Execution Sandbox: runs one translator against one input under resource
//! limits.
//!
//! Every run gets a fresh [`Context`] and is spawned as its own tokio task
//! wrapped in a wall-clock timeout. Timeouts and cancellation abort the task,
//! which drops whatever network futures it was awaiting. A translator that
//! panics surfaces as [`TranslatorError::Runtime`]. Items are only returned
//! when the run completes; a failed run returns nothing it emitted.
//!
//! Engines are cooperative: a run stops at its next await point. An engine
//! that spins on the CPU without awaiting holds a worker thread until it
//! yields.

mod context;

pub use context::Context;

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::detect::Detector;
use crate::engines::EngineSet;
use crate::error::TranslatorError;
use crate::fetch::{Document, Fetcher};
use crate::identifiers::Identifier;
use crate::item::Item;
use crate::registry::RegistrySnapshot;
use crate::translator::Translator;

/// Per-run resource limits.
#[derive(Debug, Clone)]
pub struct Limits {
    pub timeout: Duration,
    pub max_items: usize,
    pub max_fetches: usize,
    pub max_delegate_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_items: 100,
            max_fetches: 20,
            max_delegate_depth: 2,
        }
    }
}

/// What a translator runs against.
#[derive(Debug, Clone)]
pub enum Input {
    /// A fetched page. The same document is shared by detection and both
    /// execution phases.
    Web { url: String, document: Arc<Document> },
    Search(Identifier),
}

impl Input {
    pub fn describe(&self) -> String {
        match self {
            Input::Web { url, .. } => url.clone(),
            Input::Search(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Extract everything (search translators, and the CLI's select-all).
    Full,
    /// First phase of a web translation: listings with more than one
    /// candidate stop at a selection.
    DetectOnly,
    /// Second phase: extract only the selected candidate ids.
    Complete(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Items(Vec<Item>),
    /// Candidate id -> title. The only partial state a run ever returns.
    Selection(IndexMap<String, String>),
}

pub(crate) struct Shared {
    pub(crate) engines: Arc<EngineSet>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) detector: Detector,
    pub(crate) limits: Limits,
}

/// Runs translators. Cheap to clone; clones share the concurrency bound.
#[derive(Clone)]
pub struct Sandbox {
    shared: Arc<Shared>,
    permits: Arc<Semaphore>,
}

impl Sandbox {
    pub fn new(
        engines: Arc<EngineSet>,
        fetcher: Arc<dyn Fetcher>,
        detector: Detector,
        limits: Limits,
        max_concurrent: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                engines,
                fetcher,
                detector,
                limits,
            }),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.shared.limits
    }

    pub fn engines(&self) -> &EngineSet {
        &self.shared.engines
    }

    pub fn detector(&self) -> &Detector {
        &self.shared.detector
    }

    /// Run `translator` on `input`.
    ///
    /// Waiting for a concurrency permit counts against the timeout.
    pub async fn execute(
        &self,
        snapshot: Arc<RegistrySnapshot>,
        translator: Arc<Translator>,
        input: Input,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, TranslatorError> {
        let id = translator.id.clone();
        let limit = self.shared.limits.timeout;
        let engine = translator
            .engine_name()
            .and_then(|name| self.shared.engines.get(name))
            .ok_or_else(|| TranslatorError::runtime(&id, "translator has no runnable engine"))?;

        tracing::debug!(translator = %id, input = %input.describe(), mode = ?mode, "executing");

        let ctx = Context::new(
            translator,
            snapshot,
            self.shared.clone(),
            mode,
            Arc::new(context::Budget::default()),
            0,
        );
        let permits = self.permits.clone();
        let mut handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TranslatorError::Cancelled)?;
            let mut ctx = ctx;
            engine.run(&mut ctx, &input).await?;
            ctx.finish()
        });

        let joined = tokio::select! {
            _ = cancel.cancelled() => {
                handle.abort();
                tracing::info!(translator = %id, "run cancelled");
                return Err(TranslatorError::Cancelled);
            }
            joined = tokio::time::timeout(limit, &mut handle) => joined,
        };

        match joined {
            Err(_) => {
                handle.abort();
                tracing::warn!(translator = %id, limit_secs = limit.as_secs_f64(), "run timed out");
                Err(TranslatorError::Timeout {
                    translator: id,
                    limit,
                })
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                tracing::warn!(translator = %id, "translator panicked");
                Err(TranslatorError::runtime(&id, "translator panicked"))
            }
            Ok(Err(join_err)) => Err(TranslatorError::runtime(&id, join_err)),
            Ok(Ok(result)) => {
                if let Err(e) = &result {
                    tracing::warn!(translator = %id, error = %e, "run failed");
                }
                result
            }
        }
    }
}
