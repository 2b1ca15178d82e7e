//! `TranslationService`: the request-level facade the transports call.
//!
//! Web requests fetch the target once, detect against the current snapshot
//! and try candidates best first. A multi-result page parks a session and
//! returns its selection; the follow-up [`TranslationService::select`]
//! completes it.

use std::sync::Arc;

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::Config;
use crate::detect::Detector;
use crate::engines::EngineSet;
use crate::error::{DetectionError, SessionError, TranslationError, TranslatorError};
use crate::fetch::{FetchRequest, Fetcher};
use crate::item::Item;
use crate::lifecycle::{RequestLifecycle, RequestState};
use crate::registry::{LoadReport, Registry, RegistrySnapshot, RegistrySource};
use crate::resolver::Resolver;
use crate::sandbox::{ExecutionMode, ExecutionOutcome, Input, Sandbox};
use crate::session::SessionStore;
use crate::translator::{TargetType, Translator, TranslatorInfo};

/// Result of a web translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebOutcome {
    Items(Vec<Item>),
    /// The page lists several items; pick from `items` (id -> title) and
    /// call [`TranslationService::select`] with `token`.
    Selection {
        url: String,
        token: String,
        items: IndexMap<String, String>,
    },
}

pub struct TranslationService {
    registry: Arc<Registry>,
    source: RegistrySource,
    sandbox: Sandbox,
    sessions: Arc<SessionStore>,
    resolver: Resolver,
    fetcher: Arc<dyn Fetcher>,
}

fn step(lifecycle: &mut RequestLifecycle, next: RequestState) {
    if let Err(e) = lifecycle.advance(next) {
        tracing::warn!(error = %e, "unexpected request transition");
    }
}

impl TranslationService {
    /// Wire up the components. The registry starts empty; call
    /// [`TranslationService::load`].
    ///
    /// `known_formats`, when given, are the codec ids import/export
    /// translators may name.
    pub fn new(
        config: &Config,
        engines: EngineSet,
        fetcher: Arc<dyn Fetcher>,
        known_formats: Option<Vec<String>>,
    ) -> Self {
        let engines = Arc::new(engines);
        let mut registry = Registry::new(engines.clone());
        if let Some(formats) = known_formats {
            registry = registry.with_known_formats(formats);
        }
        let sandbox = Sandbox::new(
            engines,
            fetcher.clone(),
            Detector::new(config.ranking),
            config.limits.clone(),
            config.max_concurrent_runs,
        );
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        let resolver = Resolver::new(sessions.clone(), sandbox.clone());
        Self {
            registry: Arc::new(registry),
            source: config.registry_source(),
            sandbox,
            sessions,
            resolver,
            fetcher,
        }
    }

    /// Replace where translator definitions are read from.
    pub fn with_source(mut self, source: RegistrySource) -> Self {
        self.source = source;
        self
    }

    /// Load the registry from the configured source.
    pub fn load(&self) -> LoadReport {
        self.registry.load(&self.source)
    }

    /// Rebuild the registry and swap it in. In-flight requests and open
    /// sessions keep the snapshot they started with.
    pub fn reload(&self) -> LoadReport {
        self.registry.reload(&self.source)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Registry listing, optionally for one target type (then ranked).
    pub fn translators(&self, target: Option<TargetType>) -> Vec<TranslatorInfo> {
        let snapshot = self.snapshot();
        match target {
            Some(target) => snapshot
                .lookup(target)
                .iter()
                .map(|t| TranslatorInfo::from(t.as_ref()))
                .collect(),
            None => snapshot
                .all()
                .iter()
                .map(|t| TranslatorInfo::from(t.as_ref()))
                .collect(),
        }
    }

    /// Translate a web page.
    pub async fn translate_web(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<WebOutcome, TranslationError> {
        let mut lifecycle = RequestLifecycle::new(url);
        let result = self.web(url, cancel, &mut lifecycle).await;
        if let Err(e) = &result {
            step(&mut lifecycle, RequestState::Failed);
            tracing::info!(url, kind = e.kind(), error = %e, "web translation failed");
        }
        result
    }

    async fn web(
        &self,
        url: &str,
        cancel: &CancellationToken,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<WebOutcome, TranslationError> {
        step(lifecycle, RequestState::Detecting);
        let snapshot = self.snapshot();

        let request = FetchRequest::get(url);
        let document = tokio::select! {
            _ = cancel.cancelled() => return Err(TranslatorError::Cancelled.into()),
            fetched = self.fetcher.fetch(&request) => Arc::new(fetched?),
        };

        let candidates = self.sandbox.detector().detect_web(
            &snapshot,
            self.sandbox.engines(),
            url,
            &document,
        );
        if candidates.is_empty() {
            return Err(DetectionError::NoTranslator(url.to_string()).into());
        }

        step(lifecycle, RequestState::Executing);
        let input = Input::Web {
            url: url.to_string(),
            document,
        };
        let translators: Vec<Arc<Translator>> =
            candidates.into_iter().map(|c| c.translator).collect();

        let outcome = self
            .first_success(&snapshot, &translators, &input, ExecutionMode::DetectOnly, cancel)
            .await?;
        match outcome {
            Found::Items(items) => {
                step(lifecycle, RequestState::Done);
                Ok(WebOutcome::Items(items))
            }
            Found::Selection(translator, items) => {
                let token = self
                    .sessions
                    .open(translator, snapshot, input, items.clone());
                step(lifecycle, RequestState::AwaitingSelection);
                Ok(WebOutcome::Selection {
                    url: url.to_string(),
                    token,
                    items,
                })
            }
        }
    }

    /// Resolve a bare identifier (DOI, arXiv id, ISBN, PMID).
    pub async fn translate_search(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Item>, TranslationError> {
        let mut lifecycle = RequestLifecycle::new(raw);
        let result = self.search(raw, cancel, &mut lifecycle).await;
        match &result {
            Ok(_) => step(&mut lifecycle, RequestState::Done),
            Err(e) => {
                step(&mut lifecycle, RequestState::Failed);
                tracing::info!(identifier = raw, kind = e.kind(), error = %e, "search failed");
            }
        }
        result
    }

    async fn search(
        &self,
        raw: &str,
        cancel: &CancellationToken,
        lifecycle: &mut RequestLifecycle,
    ) -> Result<Vec<Item>, TranslationError> {
        step(lifecycle, RequestState::Detecting);
        let snapshot = self.snapshot();
        let (identifier, translators) = self
            .sandbox
            .detector()
            .detect_identifier(&snapshot, raw)?;

        step(lifecycle, RequestState::Executing);
        let input = Input::Search(identifier);
        match self
            .first_success(&snapshot, &translators, &input, ExecutionMode::Full, cancel)
            .await?
        {
            Found::Items(items) => Ok(items),
            Found::Selection(translator, _) => Err(TranslatorError::malformed(
                &translator.id,
                "search translators cannot ask for a selection",
            )
            .into()),
        }
    }

    /// Complete a parked selection.
    pub async fn select(
        &self,
        token: &str,
        selected: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Item>, TranslationError> {
        let mut lifecycle = RequestLifecycle::resume(token);
        let completion = match self.resolver.claim(token, selected) {
            Ok(completion) => completion,
            Err(e) => {
                let next = match e {
                    SessionError::Expired => RequestState::Expired,
                    _ => RequestState::Failed,
                };
                step(&mut lifecycle, next);
                return Err(e.into());
            }
        };

        step(&mut lifecycle, RequestState::Completing);
        let result = self.resolver.run(completion, cancel).await;
        step(
            &mut lifecycle,
            if result.is_ok() {
                RequestState::Done
            } else {
                RequestState::Failed
            },
        );
        result
    }

    /// Run `translators` in order until one produces items or a selection.
    ///
    /// Failures fall through to the next translator; cancellation does not.
    /// If at least one run succeeded with nothing, the result is empty;
    /// otherwise the last failure is returned.
    async fn first_success(
        &self,
        snapshot: &Arc<RegistrySnapshot>,
        translators: &[Arc<Translator>],
        input: &Input,
        mode: ExecutionMode,
        cancel: &CancellationToken,
    ) -> Result<Found, TranslationError> {
        let mut last_error: Option<TranslatorError> = None;
        let mut empty = false;

        for translator in translators {
            let outcome = self
                .sandbox
                .execute(
                    snapshot.clone(),
                    translator.clone(),
                    input.clone(),
                    mode.clone(),
                    cancel,
                )
                .await;
            match outcome {
                Ok(ExecutionOutcome::Selection(items)) => {
                    return Ok(Found::Selection(translator.clone(), items));
                }
                Ok(ExecutionOutcome::Items(items)) if !items.is_empty() => {
                    tracing::info!(
                        translator = %translator.id,
                        input = %input.describe(),
                        items = items.len(),
                        "translated"
                    );
                    return Ok(Found::Items(items));
                }
                Ok(ExecutionOutcome::Items(_)) => empty = true,
                Err(TranslatorError::Cancelled) => return Err(TranslatorError::Cancelled.into()),
                Err(e) => {
                    tracing::warn!(
                        translator = %translator.id,
                        error = %e,
                        "translator failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !empty => Err(e.into()),
            _ => Ok(Found::Items(Vec::new())),
        }
    }
}

enum Found {
    Items(Vec<Item>),
    Selection(Arc<Translator>, IndexMap<String, String>),
}
