//! Bare identifier recognition: DOI, arXiv, ISBN, PMID.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Identifier schemes a search translator can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Doi,
    Arxiv,
    Isbn,
    Pmid,
}

impl Scheme {
    pub const ALL: [Scheme; 4] = [Scheme::Doi, Scheme::Arxiv, Scheme::Isbn, Scheme::Pmid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Doi => "doi",
            Scheme::Arxiv => "arxiv",
            Scheme::Isbn => "isbn",
            Scheme::Pmid => "pmid",
        }
    }

    pub fn parse(name: &str) -> Option<Scheme> {
        Scheme::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified, normalized identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub scheme: Scheme,
    pub value: String,
}

impl Identifier {
    /// Normalize and classify a raw identifier string.
    ///
    /// Schemes are tried in order DOI, arXiv, ISBN, PMID; the first match
    /// wins.
    pub fn classify(raw: &str) -> Option<Identifier> {
        static DOI_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").unwrap());
        static ARXIV_NEW_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^\d{4}\.\d{4,5}(v\d+)?$").unwrap());
        static ARXIV_OLD_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[a-z-]+(\.[A-Z]{2})?/\d{7}(v\d+)?$").unwrap());
        static PMID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,8}$").unwrap());

        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let lower = raw.to_ascii_lowercase();

        let doi = strip_doi_prefix(raw);
        if DOI_RE.is_match(doi) {
            return Some(Identifier {
                scheme: Scheme::Doi,
                value: clean_doi(doi),
            });
        }

        let arxiv = strip_any_prefix(
            raw,
            &lower,
            &[
                "arxiv:",
                "https://arxiv.org/abs/",
                "http://arxiv.org/abs/",
                "arxiv.org/abs/",
            ],
        );
        if ARXIV_NEW_RE.is_match(arxiv) || ARXIV_OLD_RE.is_match(arxiv) {
            return Some(Identifier {
                scheme: Scheme::Arxiv,
                value: arxiv.to_string(),
            });
        }

        let isbn_raw = strip_any_prefix(raw, &lower, &["isbn:", "isbn"]);
        let isbn: String = isbn_raw
            .chars()
            .filter(|c| !matches!(c, '-' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if is_valid_isbn(&isbn) {
            return Some(Identifier {
                scheme: Scheme::Isbn,
                value: isbn,
            });
        }

        let pmid = strip_any_prefix(raw, &lower, &["pmid:", "pmid"]).trim();
        if PMID_RE.is_match(pmid) {
            return Some(Identifier {
                scheme: Scheme::Pmid,
                value: pmid.to_string(),
            });
        }

        None
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.value)
    }
}

/// Strip the first matching ASCII-case-insensitive prefix.
fn strip_any_prefix<'a>(raw: &'a str, lower: &str, prefixes: &[&str]) -> &'a str {
    prefixes
        .iter()
        .find(|p| lower.starts_with(*p))
        .map(|p| raw[p.len()..].trim_start())
        .unwrap_or(raw)
}

fn strip_doi_prefix(raw: &str) -> &str {
    static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)^(?:doi:\s*|https?://(?:dx\.)?doi\.org/|(?:dx\.)?doi\.org/)").unwrap()
    });
    match PREFIX_RE.find(raw) {
        Some(m) => &raw[m.end()..],
        None => raw,
    }
}

/// Strip resolver prefixes, trailing punctuation and unbalanced closing
/// brackets from a DOI.
pub fn clean_doi(doi: &str) -> String {
    const TRAILING: [char; 4] = ['.', ',', ';', ':'];
    let mut doi = strip_doi_prefix(doi.trim()).trim_end_matches(TRAILING);

    for (open, close) in [('(', ')'), ('[', ']'), ('{', '}')] {
        while doi.ends_with(close) && doi.matches(close).count() > doi.matches(open).count() {
            doi = doi[..doi.len() - 1].trim_end_matches(TRAILING);
        }
    }

    doi.to_string()
}

/// Checksum-validate an ISBN-10 or ISBN-13 with separators already removed.
pub fn is_valid_isbn(isbn: &str) -> bool {
    let bytes = isbn.as_bytes();
    match bytes.len() {
        10 => {
            let mut sum = 0u32;
            for (i, b) in bytes.iter().enumerate() {
                let digit = match b {
                    b'0'..=b'9' => (b - b'0') as u32,
                    b'X' | b'x' if i == 9 => 10,
                    _ => return false,
                };
                sum += digit * (10 - i as u32);
            }
            sum % 11 == 0
        }
        13 => {
            if !bytes.iter().all(u8::is_ascii_digit) {
                return false;
            }
            let sum: u32 = bytes
                .iter()
                .enumerate()
                .map(|(i, b)| (b - b'0') as u32 * if i % 2 == 0 { 1 } else { 3 })
                .sum();
            sum % 10 == 0
        }
        _ => false,
    }
}
