use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use super::{ExecutionMode, ExecutionOutcome, Input, Shared};
use crate::error::{FetchError, TranslatorError};
use crate::fetch::{Document, FetchRequest};
use crate::item::Item;
use crate::registry::RegistrySnapshot;
use crate::translator::Translator;

/// Counters shared by a run and every delegate it spawns.
#[derive(Debug, Default)]
pub(crate) struct Budget {
    fetches: AtomicUsize,
}

static EMPTY_PAYLOAD: Lazy<toml::Table> = Lazy::new(toml::Table::new);

/// The capability handle a translator run works through.
///
/// Fetching and delegation are only available when the translator declared
/// them. Emitting items and presenting a selection always are.
pub struct Context {
    translator: Arc<Translator>,
    snapshot: Arc<RegistrySnapshot>,
    shared: Arc<Shared>,
    mode: ExecutionMode,
    budget: Arc<Budget>,
    depth: usize,
    items: Vec<Item>,
    selection: Option<IndexMap<String, String>>,
}

impl Context {
    pub(crate) fn new(
        translator: Arc<Translator>,
        snapshot: Arc<RegistrySnapshot>,
        shared: Arc<Shared>,
        mode: ExecutionMode,
        budget: Arc<Budget>,
        depth: usize,
    ) -> Self {
        Self {
            translator,
            snapshot,
            shared,
            mode,
            budget,
            depth,
            items: Vec::new(),
            selection: None,
        }
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// The translator's engine payload (empty for codec entries).
    pub fn payload(&self) -> &toml::Table {
        self.translator.payload().unwrap_or(&EMPTY_PAYLOAD)
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// A runtime error attributed to this run's translator.
    pub fn error(&self, message: impl std::fmt::Display) -> TranslatorError {
        TranslatorError::runtime(&self.translator.id, message)
    }

    /// Fetch a document. Counts against the run's fetch budget.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Document, TranslatorError> {
        if !self.translator.capabilities.fetch {
            return Err(self.error("fetch capability not granted"));
        }
        self.fetch_counted(&request).await
    }

    async fn fetch_counted(&self, request: &FetchRequest) -> Result<Document, TranslatorError> {
        let id = &self.translator.id;
        let used = self.budget.fetches.fetch_add(1, Ordering::SeqCst);
        if used >= self.shared.limits.max_fetches {
            return Err(TranslatorError::resource_limit(id, "fetch"));
        }

        tracing::debug!(translator = %id, url = %request.url, "translator fetch");
        self.shared
            .fetcher
            .fetch(request)
            .await
            .map_err(|e| match e {
                FetchError::TooLarge { .. } => TranslatorError::resource_limit(id, "response size"),
                other => TranslatorError::runtime(id, other),
            })
    }

    pub async fn fetch_url(&self, url: &str) -> Result<Document, TranslatorError> {
        self.fetch(FetchRequest::get(url)).await
    }

    /// Parse a fetched document as JSON.
    pub fn json(&self, document: &Document) -> Result<serde_json::Value, TranslatorError> {
        document.json().map_err(|e| {
            TranslatorError::malformed(
                &self.translator.id,
                format!("invalid JSON from {}: {}", document.url, e),
            )
        })
    }

    /// Hand an item to the run's output buffer.
    pub fn emit(&mut self, item: Item) -> Result<(), TranslatorError> {
        if self.items.len() >= self.shared.limits.max_items {
            return Err(TranslatorError::resource_limit(&self.translator.id, "items"));
        }
        self.items.push(item);
        Ok(())
    }

    /// Offer a listing of `candidates` (id -> title).
    ///
    /// Returns the ids to extract now, or `None` when the run must stop and
    /// hand the listing back for disambiguation. A single candidate never
    /// needs disambiguation.
    pub fn select(
        &mut self,
        candidates: IndexMap<String, String>,
    ) -> Result<Option<Vec<String>>, TranslatorError> {
        match &self.mode {
            ExecutionMode::DetectOnly if candidates.len() > 1 => {
                let incomplete = candidates
                    .iter()
                    .any(|(id, title)| id.trim().is_empty() || title.trim().is_empty());
                if incomplete {
                    return Err(TranslatorError::malformed(
                        &self.translator.id,
                        "selection candidates need an id and a title",
                    ));
                }
                self.selection = Some(candidates);
                Ok(None)
            }
            ExecutionMode::Complete(selected) => Ok(Some(
                selected
                    .iter()
                    .filter(|id| candidates.contains_key(*id))
                    .cloned()
                    .collect(),
            )),
            ExecutionMode::Full | ExecutionMode::DetectOnly => {
                Ok(Some(candidates.into_keys().collect()))
            }
        }
    }

    /// Run detection and execution on `url` in a child context that shares
    /// this run's snapshot, deadline and fetch budget. The child's items are
    /// emitted here.
    pub async fn delegate_web(&mut self, url: &str) -> Result<(), TranslatorError> {
        if !self.translator.capabilities.delegate {
            return Err(self.error("delegate capability not granted"));
        }
        if self.depth + 1 > self.shared.limits.max_delegate_depth {
            return Err(TranslatorError::resource_limit(&self.translator.id, "delegate depth"));
        }

        let document = self.fetch_counted(&FetchRequest::get(url)).await?;

        let candidates = self
            .shared
            .detector
            .detect_web(&self.snapshot, &self.shared.engines, url, &document);
        let Some(target) = candidates.into_iter().next() else {
            return Err(self.error(format!("no translator for delegated url {}", url)));
        };
        let engine = target
            .translator
            .engine_name()
            .and_then(|name| self.shared.engines.get(name))
            .ok_or_else(|| self.error(format!("delegate {} has no engine", target.translator.id)))?;

        tracing::debug!(
            translator = %self.translator.id,
            delegate = %target.translator.id,
            url,
            "delegating"
        );

        let mut child = Context::new(
            target.translator,
            self.snapshot.clone(),
            self.shared.clone(),
            ExecutionMode::Full,
            self.budget.clone(),
            self.depth + 1,
        );
        let input = Input::Web {
            url: url.to_string(),
            document: Arc::new(document),
        };
        engine.run(&mut child, &input).await?;
        for item in child.items {
            self.emit(item)?;
        }
        Ok(())
    }

    /// Validate and normalize the buffered output.
    pub(crate) fn finish(self) -> Result<ExecutionOutcome, TranslatorError> {
        if let Some(selection) = self.selection {
            return Ok(ExecutionOutcome::Selection(selection));
        }

        let mut items = self.items;
        for item in &mut items {
            if !item.has_known_type() {
                return Err(TranslatorError::malformed(
                    &self.translator.id,
                    format!("unknown item type '{}'", item.item_type),
                ));
            }
            item.normalize();
        }
        Ok(ExecutionOutcome::Items(items))
    }
}
