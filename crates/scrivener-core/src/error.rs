//! Error taxonomy for the translation engine.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// A translator definition that was rejected at load time.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{source_name}: {reason}")]
pub struct ValidationError {
    /// File name or inline label the definition came from.
    pub source_name: String,
    /// Translator id, when it could be read.
    pub translator: Option<String>,
    pub reason: String,
}

impl ValidationError {
    pub fn new(source_name: &str, translator: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.to_string(),
            translator: translator.map(String::from),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("no translator found for {0}")]
    NoTranslator(String),
    #[error("unrecognized identifier: {0}")]
    UnrecognizedIdentifier(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslatorError {
    #[error("translator {translator} timed out after {}s", .limit.as_secs_f64())]
    Timeout { translator: String, limit: Duration },
    #[error("translator {translator} failed: {message}")]
    Runtime { translator: String, message: String },
    #[error("translator {translator} produced malformed output: {message}")]
    MalformedOutput { translator: String, message: String },
    #[error("translator {translator} exceeded {limit} limit")]
    ResourceLimit { translator: String, limit: String },
    #[error("translation cancelled")]
    Cancelled,
}

impl TranslatorError {
    pub fn runtime(translator: &str, message: impl std::fmt::Display) -> Self {
        Self::Runtime {
            translator: translator.to_string(),
            message: message.to_string(),
        }
    }

    pub fn malformed(translator: &str, message: impl std::fmt::Display) -> Self {
        Self::MalformedOutput {
            translator: translator.to_string(),
            message: message.to_string(),
        }
    }

    pub fn resource_limit(translator: &str, limit: &str) -> Self {
        Self::ResourceLimit {
            translator: translator.to_string(),
            limit: limit.to_string(),
        }
    }

    /// Stable snake_case kind for transport payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslatorError::Timeout { .. } => "translator_timeout",
            TranslatorError::Runtime { .. } => "translator_runtime",
            TranslatorError::MalformedOutput { .. } => "translator_malformed_output",
            TranslatorError::ResourceLimit { .. } => "translator_resource_limit",
            TranslatorError::Cancelled => "cancelled",
        }
    }
}

/// Session failures. `NotFound` and `Expired` share one message so a caller
/// cannot probe whether a token ever existed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session not found or expired")]
    NotFound,
    #[error("session not found or expired")]
    Expired,
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}

impl SessionError {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotFound | SessionError::Expired => "session_not_found",
            SessionError::InvalidSelection(_) => "invalid_selection",
        }
    }
}

/// Failure fetching a remote resource through the fetch capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("rate limited by {host}")]
    RateLimited { host: String },
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
}

/// Everything a single translation request can fail with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Translator(#[from] TranslatorError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl TranslationError {
    /// Stable snake_case kind for the `{kind, message}` error payload.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslationError::Detection(DetectionError::UnrecognizedIdentifier(_)) => {
                "unrecognized_identifier"
            }
            TranslationError::Detection(_) => "no_translator",
            TranslationError::Translator(e) => e.kind(),
            TranslationError::Session(e) => e.kind(),
            TranslationError::Fetch(_) => "fetch_failed",
        }
    }
}
