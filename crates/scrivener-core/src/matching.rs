//! Duplicate detection between Items.
//!
//! Identifier equality decides outright. Otherwise the cleaned titles are
//! compared fuzzily, and a borderline title score can be carried over the
//! line by agreeing metadata (DOI, date, item type, creators).

use std::collections::HashSet;

use crate::item::Item;
use crate::text::{clean_title, normalize_author_name};

/// Title similarity that alone makes two items duplicates.
pub const TITLE_THRESHOLD: f64 = 0.80;
/// Lower title similarity accepted when metadata agrees.
pub const RELAXED_TITLE_THRESHOLD: f64 = 0.76;
/// Metadata score required for the relaxed threshold.
pub const METADATA_THRESHOLD: u32 = 5;

/// Similarity of two titles after cleanup, in `0.0..=1.0`.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = clean_title(a).to_lowercase();
    let b = clean_title(b).to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

fn same_field(a: &Item, b: &Item, key: &str) -> bool {
    match (a.get(key), b.get(key)) {
        (Some(x), Some(y)) => x.trim().eq_ignore_ascii_case(y.trim()),
        _ => false,
    }
}

fn family_names(item: &Item) -> HashSet<String> {
    item.creators
        .iter()
        .map(|c| normalize_author_name(c.last_name()))
        .filter(|n| !n.is_empty())
        .collect()
}

/// Agreement score between two items' metadata.
///
/// DOI +5, identical date +2, identical item type +1, creator family names
/// overlapping in at least two names or half of `b`'s creators +2.
pub fn metadata_score(a: &Item, b: &Item) -> u32 {
    let mut score = 0;
    if same_field(a, b, "DOI") {
        score += 5;
    }
    if matches!((a.get("date"), b.get("date")), (Some(x), Some(y)) if x == y) {
        score += 2;
    }
    if a.item_type == b.item_type {
        score += 1;
    }

    let names_a = family_names(a);
    let names_b = family_names(b);
    let shared = names_a.intersection(&names_b).count();
    if shared > 0 && (shared >= 2 || shared as f64 / names_b.len().max(1) as f64 >= 0.5) {
        score += 2;
    }
    score
}

/// Whether `a` and `b` describe the same work.
pub fn is_duplicate(a: &Item, b: &Item) -> bool {
    if same_field(a, b, "DOI") {
        return true;
    }

    let (Some(title_a), Some(title_b)) = (a.title(), b.title()) else {
        return false;
    };
    let similarity = title_similarity(title_a, title_b);

    if same_field(a, b, "ISSN") && similarity >= 0.99 {
        return true;
    }

    similarity >= TITLE_THRESHOLD
        || (similarity >= RELAXED_TITLE_THRESHOLD && metadata_score(a, b) >= METADATA_THRESHOLD)
}

/// Drop later duplicates, keeping the first item of each group in order.
pub fn dedupe(items: Vec<Item>) -> Vec<Item> {
    let mut kept: Vec<Item> = Vec::with_capacity(items.len());
    for item in items {
        if let Some(existing) = kept.iter().find(|k| is_duplicate(k, &item)) {
            tracing::debug!(
                title = existing.title().unwrap_or_default(),
                "dropping duplicate item"
            );
            continue;
        }
        kept.push(item);
    }
    kept
}
