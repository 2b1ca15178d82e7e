//! Translator definitions.
//!
//! A translator is described by a TOML manifest:
//!
//! ```toml
//! id = "example-journal"
//! label = "Example Journal"
//! target = "web"
//! priority = 100
//! engine = "scrape"
//!
//! [detect]
//! url = '^https?://journal\.example\.org/article/'
//! selector = "h1.article-title"
//!
//! [capabilities]
//! fetch = true
//!
//! [payload]
//! # engine-specific
//! ```
//!
//! Import and export translators name a codec `format` instead of an engine.

use std::fmt;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identifiers::Scheme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Web,
    Search,
    Import,
    Export,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Web => "web",
            TargetType::Search => "search",
            TargetType::Import => "import",
            TargetType::Export => "export",
        }
    }

    pub fn parse(name: &str) -> Option<TargetType> {
        [
            TargetType::Web,
            TargetType::Search,
            TargetType::Import,
            TargetType::Export,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities a translator may request from the sandbox. Emitting items and
/// presenting a selection are always available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Capabilities {
    /// Outbound HTTP through the rate-limited fetcher.
    pub fetch: bool,
    /// Re-running detection and execution on a derived URL.
    pub delegate: bool,
}

/// On-disk manifest, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub id: String,
    pub label: String,
    pub target: String,
    #[serde(default)]
    pub priority: i32,
    pub engine: Option<String>,
    pub format: Option<String>,
    #[serde(default)]
    pub detect: DetectManifest,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub payload: toml::Table,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectManifest {
    /// URL regex (web).
    pub url: Option<String>,
    /// CSS selector that must match the fetched page (web).
    pub selector: Option<String>,
    /// Identifier scheme (search).
    pub scheme: Option<String>,
}

/// Validated web detection rule.
#[derive(Debug, Clone)]
pub struct WebRule {
    pub url: Option<Regex>,
    pub selector: Option<Selector>,
    pub specificity: Specificity,
}

#[derive(Debug, Clone)]
pub enum DetectionRule {
    Web(WebRule),
    Scheme(Scheme),
    /// Import/export entries are chosen by format id, not detected.
    Format,
}

/// How narrowly a URL pattern targets its pages. Compared literal characters
/// first, then path segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Specificity {
    pub literal_chars: usize,
    pub path_segments: usize,
}

impl Specificity {
    /// Score a regex source by its literal content.
    ///
    /// Escaped characters count as literals; metacharacters, class escapes
    /// (`\d`, `\w`, ...) and bracketed classes do not.
    pub fn of_pattern(pattern: &str) -> Specificity {
        let mut literal_chars = 0;
        let mut slashes: usize = 0;
        let mut chars = pattern.chars().peekable();
        let mut in_class = false;

        while let Some(c) = chars.next() {
            if in_class {
                match c {
                    '\\' => {
                        chars.next();
                    }
                    ']' => in_class = false,
                    _ => {}
                }
                continue;
            }
            match c {
                '\\' => match chars.next() {
                    Some(e) if e.is_ascii_alphanumeric() => {}
                    Some(e) => {
                        literal_chars += 1;
                        if e == '/' {
                            slashes += 1;
                        }
                    }
                    None => {}
                },
                '[' => in_class = true,
                '^' | '$' | '.' | '*' | '+' | '?' | '(' | ')' | '{' | '}' | '|' => {}
                '/' => {
                    literal_chars += 1;
                    slashes += 1;
                }
                _ => literal_chars += 1,
            }
        }

        // "scheme://host/" contributes three slashes before the first segment.
        let path_segments = if pattern.contains("://") {
            slashes.saturating_sub(3)
        } else {
            slashes
        };
        Specificity {
            literal_chars,
            path_segments,
        }
    }
}

/// How a translator is executed.
#[derive(Debug, Clone)]
pub enum Executable {
    /// Run by a sandbox engine with an engine-specific payload.
    Engine { name: String, payload: toml::Table },
    /// Served by a format codec.
    Codec { format: String },
}

/// A loaded, validated translator. Immutable once built.
#[derive(Debug, Clone)]
pub struct Translator {
    pub id: String,
    pub label: String,
    pub target: TargetType,
    pub priority: i32,
    pub rule: DetectionRule,
    pub capabilities: Capabilities,
    pub executable: Executable,
}

impl Translator {
    /// Parse and structurally validate a manifest. Engine payload checks are
    /// done by the registry, which knows the available engines.
    pub fn from_toml(source_name: &str, text: &str) -> Result<Translator, ValidationError> {
        let manifest: Manifest = toml::from_str(text)
            .map_err(|e| {
                ValidationError::new(source_name, None, format!("invalid manifest: {}", e))
            })?;
        Translator::from_manifest(source_name, manifest)
    }

    pub fn from_manifest(
        source_name: &str,
        manifest: Manifest,
    ) -> Result<Translator, ValidationError> {
        let id = manifest.id.trim().to_string();
        let invalid = |reason: String| ValidationError::new(source_name, Some(&id), reason);

        if id.is_empty() {
            return Err(ValidationError::new(source_name, None, "empty translator id"));
        }
        let target = TargetType::parse(&manifest.target)
            .ok_or_else(|| invalid(format!("unknown target type '{}'", manifest.target)))?;

        let rule = match target {
            TargetType::Web => {
                let detect = &manifest.detect;
                if detect.url.is_none() && detect.selector.is_none() {
                    return Err(invalid("web translator needs a url or selector rule".into()));
                }
                let url = detect
                    .url
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|e| invalid(format!("bad url pattern: {}", e)))?;
                let selector = detect
                    .selector
                    .as_deref()
                    .map(|s| {
                        Selector::parse(s)
                            .map_err(|e| invalid(format!("bad selector '{}': {}", s, e)))
                    })
                    .transpose()?;
                let specificity = detect
                    .url
                    .as_deref()
                    .map(Specificity::of_pattern)
                    .unwrap_or_default();
                DetectionRule::Web(WebRule {
                    url,
                    selector,
                    specificity,
                })
            }
            TargetType::Search => {
                let raw = manifest
                    .detect
                    .scheme
                    .as_deref()
                    .ok_or_else(|| invalid("search translator needs a scheme".into()))?;
                let scheme = Scheme::parse(raw)
                    .ok_or_else(|| invalid(format!("unknown identifier scheme '{}'", raw)))?;
                DetectionRule::Scheme(scheme)
            }
            TargetType::Import | TargetType::Export => DetectionRule::Format,
        };

        let executable = match (target, manifest.engine, manifest.format) {
            (TargetType::Web | TargetType::Search, Some(engine), None) => Executable::Engine {
                name: engine,
                payload: manifest.payload,
            },
            (TargetType::Import | TargetType::Export, None, Some(format)) => {
                Executable::Codec { format }
            }
            (TargetType::Web | TargetType::Search, _, _) => {
                return Err(invalid(format!("{} translator needs an engine and no format", target)));
            }
            (_, _, _) => {
                return Err(invalid(format!("{} translator needs a format and no engine", target)));
            }
        };

        Ok(Translator {
            id,
            label: manifest.label,
            target,
            priority: manifest.priority,
            rule,
            capabilities: manifest.capabilities,
            executable,
        })
    }

    pub fn specificity(&self) -> Specificity {
        match &self.rule {
            DetectionRule::Web(rule) => rule.specificity,
            _ => Specificity::default(),
        }
    }

    pub fn engine_name(&self) -> Option<&str> {
        match &self.executable {
            Executable::Engine { name, .. } => Some(name),
            Executable::Codec { .. } => None,
        }
    }

    pub fn payload(&self) -> Option<&toml::Table> {
        match &self.executable {
            Executable::Engine { payload, .. } => Some(payload),
            Executable::Codec { .. } => None,
        }
    }

    pub fn format(&self) -> Option<&str> {
        match &self.executable {
            Executable::Codec { format } => Some(format),
            Executable::Engine { .. } => None,
        }
    }

    pub fn scheme(&self) -> Option<Scheme> {
        match &self.rule {
            DetectionRule::Scheme(s) => Some(*s),
            _ => None,
        }
    }

    /// Whether the URL part of a web rule accepts `url`. Rules without a
    /// URL pattern accept every URL.
    pub fn matches_url(&self, url: &str) -> bool {
        match &self.rule {
            DetectionRule::Web(rule) => rule.url.as_ref().is_none_or(|re| re.is_match(url)),
            _ => false,
        }
    }
}

/// Public summary of a translator, as listed by the registry endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TranslatorInfo {
    pub id: String,
    pub label: String,
    pub target: TargetType,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Scheme>,
}

impl From<&Translator> for TranslatorInfo {
    fn from(t: &Translator) -> Self {
        Self {
            id: t.id.clone(),
            label: t.label.clone(),
            target: t.target,
            priority: t.priority,
            engine: t.engine_name().map(String::from),
            format: t.format().map(String::from),
            scheme: t.scheme(),
        }
    }
}
