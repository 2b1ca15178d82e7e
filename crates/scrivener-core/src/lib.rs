use std::path::PathBuf;
use std::time::Duration;

pub mod config_file;
pub mod csl;
pub mod detect;
pub mod engines;
pub mod error;
pub mod fetch;
pub mod identifiers;
pub mod item;
pub mod lifecycle;
pub mod matching;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod service;
pub mod session;
pub mod text;
pub mod translator;

// Re-export for convenience
pub use detect::{Candidate, Detector, RankingPolicy};
pub use engines::{Detected, EngineSet, TranslatorEngine};
pub use error::{
    DetectionError, FetchError, SessionError, TranslationError, TranslatorError, ValidationError,
};
pub use fetch::{Document, FetchConfig, FetchRequest, Fetcher, HttpFetcher};
pub use identifiers::{Identifier, Scheme};
pub use item::{Attachment, Creator, CreatorName, Item, Tag};
pub use registry::{LoadReport, Registry, RegistrySnapshot, RegistrySource};
pub use sandbox::{Context, ExecutionMode, ExecutionOutcome, Input, Limits, Sandbox};
pub use service::{TranslationService, WebOutcome};
pub use session::SessionStore;
pub use translator::{TargetType, Translator, TranslatorInfo};

pub use tokio_util::sync::CancellationToken;

/// Runtime configuration for a [`TranslationService`].
#[derive(Debug, Clone)]
pub struct Config {
    pub limits: Limits,
    /// Upper bound on simultaneous translator runs.
    pub max_concurrent_runs: usize,
    pub session_ttl: Duration,
    pub ranking: RankingPolicy,
    pub fetch: FetchConfig,
    /// Manifest directories loaded after the built-in translators.
    pub translator_dirs: Vec<PathBuf>,
    pub include_builtin: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            max_concurrent_runs: 16,
            session_ttl: Duration::from_secs(600),
            ranking: RankingPolicy::default(),
            fetch: FetchConfig::default(),
            translator_dirs: Vec::new(),
            include_builtin: true,
        }
    }
}

impl Config {
    /// Where the registry reads translator definitions from.
    pub fn registry_source(&self) -> RegistrySource {
        let mut sources = Vec::new();
        if self.include_builtin {
            sources.push(RegistrySource::Builtin);
        }
        sources.extend(
            self.translator_dirs
                .iter()
                .cloned()
                .map(RegistrySource::Directory),
        );
        RegistrySource::Chain(sources)
    }
}
