//! Format codecs: convert [`Item`]s to and from interchange formats.
//!
//! Every codec is a pure function over bytes; nothing here touches the
//! network or the translator registry.

pub mod bibtex;
pub mod csljson;
pub mod csv;
pub mod json;
pub mod ris;

use std::collections::HashSet;

use scrivener_core::Item;
use serde::Serialize;
use thiserror::Error;

/// A supported interchange format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Bibtex,
    Ris,
    CslJson,
    Json,
    Csv,
}

impl Format {
    pub const ALL: [Format; 5] = [
        Format::Bibtex,
        Format::Ris,
        Format::CslJson,
        Format::Json,
        Format::Csv,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Format::Bibtex => "bibtex",
            Format::Ris => "ris",
            Format::CslJson => "csljson",
            Format::Json => "json",
            Format::Csv => "csv",
        }
    }

    pub fn parse(id: &str) -> Option<Format> {
        let id = id.trim().to_ascii_lowercase();
        Format::ALL.into_iter().find(|f| f.id() == id).or(match id.as_str() {
            "bib" => Some(Format::Bibtex),
            "csl-json" | "csl" => Some(Format::CslJson),
            _ => None,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Bibtex => "application/x-bibtex",
            Format::Ris => "application/x-research-info-systems",
            Format::CslJson => "application/vnd.citationstyles.csl+json",
            Format::Json => "application/json",
            Format::Csv => "text/csv",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Format::Bibtex => "bib",
            Format::Ris => "ris",
            Format::CslJson | Format::Json => "json",
            Format::Csv => "csv",
        }
    }

    /// CSV is write-only.
    pub fn can_import(&self) -> bool {
        !matches!(self, Format::Csv)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Ids of every codec, for registry validation and error messages.
pub fn format_ids() -> Vec<String> {
    Format::ALL.iter().map(|f| f.id().to_string()).collect()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported format '{format}' (expected one of: {})", .valid.join(", "))]
pub struct UnsupportedFormatError {
    pub format: String,
    pub valid: Vec<String>,
}

impl UnsupportedFormatError {
    fn new(format: &str, formats: impl Iterator<Item = Format>) -> Self {
        Self {
            format: format.to_string(),
            valid: formats.map(|f| f.id().to_string()).collect(),
        }
    }
}

/// One-based location inside an imported payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    /// Position of a byte offset into `text`.
    pub fn at_offset(text: &str, offset: usize) -> Self {
        let mut offset = offset.min(text.len());
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &text[..offset];
        let line = before.matches('\n').count() + 1;
        let column = match before.rfind('\n') {
            Some(nl) => before[nl + 1..].chars().count() + 1,
            None => before.chars().count() + 1,
        };
        Self { line, column }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}{}", .position.map(|p| format!(" (line {}, column {})", p.line, p.column)).unwrap_or_default())]
pub struct ImportError {
    pub reason: String,
    pub position: Option<Position>,
}

impl ImportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            position: None,
        }
    }

    pub fn at(reason: impl Into<String>, position: Position) -> Self {
        Self {
            reason: reason.into(),
            position: Some(position),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedFormatError),
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl CodecError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CodecError::Unsupported(_) => "unsupported_format",
            CodecError::Import(_) => "import_failed",
        }
    }
}

/// Serialized items plus what a transport needs to label them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub format: Format,
    pub bytes: Vec<u8>,
}

impl Exported {
    pub fn content_type(&self) -> String {
        format!("{}; charset=utf-8", self.format.mime_type())
    }
}

/// Serialize `items` as `format_id`.
pub fn export_items(items: &[Item], format_id: &str) -> Result<Exported, UnsupportedFormatError> {
    let format = Format::parse(format_id)
        .ok_or_else(|| UnsupportedFormatError::new(format_id, Format::ALL.into_iter()))?;
    let text = match format {
        Format::Bibtex => bibtex::export(items),
        Format::Ris => ris::export(items),
        Format::CslJson => csljson::export(items),
        Format::Json => json::export(items),
        Format::Csv => csv::export(items),
    };
    tracing::debug!(format = %format, items = items.len(), bytes = text.len(), "exported");
    Ok(Exported {
        format,
        bytes: text.into_bytes(),
    })
}

/// Guess a payload's format from its leading content.
pub fn sniff(text: &str) -> Option<Format> {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        // Native items carry `itemType`; CSL-JSON carries `type`.
        let head: String = trimmed.chars().take(4096).collect();
        if head.contains("\"itemType\"") {
            return Some(Format::Json);
        }
        if head.contains("\"type\"") {
            return Some(Format::CslJson);
        }
        return None;
    }
    if ris::looks_like(trimmed) {
        return Some(Format::Ris);
    }
    if bibtex::looks_like(trimmed) {
        return Some(Format::Bibtex);
    }
    None
}

fn decode(bytes: &[u8]) -> Result<&str, ImportError> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let position = Position::at_offset(&String::from_utf8_lossy(bytes), e.valid_up_to());
        ImportError::at("payload is not valid UTF-8", position)
    })?;
    Ok(text.trim_start_matches('\u{feff}'))
}

fn resolve_format(text: &str, format_hint: Option<&str>) -> Result<Format, CodecError> {
    match (sniff(text), format_hint) {
        (Some(format), _) => Ok(format),
        (None, Some(hint)) => Format::parse(hint)
            .filter(Format::can_import)
            .ok_or_else(|| {
                let importable = Format::ALL.into_iter().filter(Format::can_import);
                UnsupportedFormatError::new(hint, importable).into()
            }),
        (None, None) => Err(ImportError::new("unrecognized payload format").into()),
    }
}

/// The format [`import_payload`] would decode `bytes` with: the sniffed
/// format when the content is conclusive, otherwise the hint.
pub fn import_format(bytes: &[u8], format_hint: Option<&str>) -> Result<Format, CodecError> {
    resolve_format(decode(bytes)?, format_hint)
}

/// Parse a payload into normalized items.
///
/// The payload signature wins over `format_hint`; the hint is used only when
/// sniffing is inconclusive.
pub fn import_payload(bytes: &[u8], format_hint: Option<&str>) -> Result<Vec<Item>, CodecError> {
    let text = decode(bytes)?;
    let format = resolve_format(text, format_hint)?;

    let items = match format {
        Format::Bibtex => bibtex::import(text)?,
        Format::Ris => ris::import(text)?,
        Format::CslJson => csljson::import(text)?,
        Format::Json => json::import(text)?,
        Format::Csv => {
            return Err(UnsupportedFormatError::new(
                format.id(),
                Format::ALL.into_iter().filter(Format::can_import),
            )
            .into());
        }
    };

    let mut normalized = Vec::with_capacity(items.len());
    for (index, mut item) in items.into_iter().enumerate() {
        if !item.has_known_type() {
            return Err(ImportError::new(format!(
                "record {} has unknown item type '{}'",
                index + 1,
                item.item_type
            ))
            .into());
        }
        item.normalize();
        normalized.push(item);
    }
    tracing::debug!(format = %format, items = normalized.len(), "imported");
    Ok(normalized)
}

/// Citation keys in the usual `familyYEARword` shape, unique within one export.
pub(crate) struct CitationKeys {
    used: HashSet<String>,
}

impl CitationKeys {
    pub(crate) fn new() -> Self {
        Self {
            used: HashSet::new(),
        }
    }

    pub(crate) fn next(&mut self, item: &Item) -> String {
        let family = item
            .creators
            .first()
            .map(|c| ascii_word(c.last_name()))
            .unwrap_or_default();
        let word = item
            .title()
            .and_then(|t| {
                t.split_whitespace()
                    .map(ascii_word)
                    .find(|w| w.len() > 3 && !STOP_WORDS.contains(&w.as_str()))
            })
            .unwrap_or_default();
        let mut base = format!("{}{}{}", family, item.year().unwrap_or_default(), word);
        if base.is_empty() {
            base = "item".to_string();
        }

        let mut key = base.clone();
        let mut n: u32 = 0;
        while self.used.contains(&key) {
            key = match char::from_u32('a' as u32 + n).filter(|c| *c <= 'z') {
                Some(letter) => format!("{}{}", base, letter),
                None => format!("{}{}", base, n),
            };
            n += 1;
        }
        self.used.insert(key.clone());
        key
    }
}

const STOP_WORDS: &[&str] = &["the", "and", "from", "with", "that", "this", "into", "over"];

fn ascii_word(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
