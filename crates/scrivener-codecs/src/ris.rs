//! RIS codec.
//!
//! Records are `TAG  - value` lines from `TY` to `ER`. Continuation lines
//! without a tag are appended to the previous value.

use once_cell::sync::Lazy;
use regex::Regex;
use scrivener_core::{Creator, CreatorName, Item, Tag};
use scrivener_core::identifiers::is_valid_isbn;

use crate::{ImportError, Position};

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Z][A-Z0-9])  -(?: (.*))?$").unwrap());

pub(crate) fn looks_like(text: &str) -> bool {
    text.lines()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim_end().starts_with("TY  -"))
}

/// RIS reference type to item type.
const TYPES: &[(&str, &str)] = &[
    ("JOUR", "journalArticle"),
    ("BOOK", "book"),
    ("CHAP", "bookSection"),
    ("CONF", "conferencePaper"),
    ("CPAPER", "conferencePaper"),
    ("THES", "thesis"),
    ("RPRT", "report"),
    ("ELEC", "webpage"),
    ("MGZN", "magazineArticle"),
    ("NEWS", "newspaperArticle"),
    ("UNPB", "manuscript"),
    ("PAT", "patent"),
    ("COMP", "computerProgram"),
    ("DATA", "dataset"),
    ("GEN", "document"),
];

fn item_type_for(ris: &str) -> &'static str {
    match ris {
        "EJOUR" | "JFULL" | "ABST" | "INPR" => "journalArticle",
        "EBOOK" | "EDBOOK" => "book",
        "ECHAP" => "bookSection",
        "WEB" | "BLOG" => "webpage",
        _ => TYPES
            .iter()
            .find(|(tag, _)| *tag == ris)
            .map(|(_, t)| *t)
            .unwrap_or("document"),
    }
}

fn ris_type_for(item_type: &str) -> &'static str {
    match item_type {
        "preprint" => "UNPB",
        _ => TYPES
            .iter()
            .find(|(_, t)| *t == item_type)
            .map(|(tag, _)| *tag)
            .unwrap_or("GEN"),
    }
}

fn creator_type_for(tag: &str) -> Option<&'static str> {
    match tag {
        "AU" | "A1" => Some("author"),
        "A2" | "ED" => Some("editor"),
        "A3" => Some("seriesEditor"),
        "A4" => Some("translator"),
        _ => None,
    }
}

/// RIS dates are `YYYY/MM/DD/other`; any part may be empty.
fn parse_date(raw: &str) -> String {
    let parts: Vec<&str> = raw.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [year, month, day, ..] if !day.is_empty() && !month.is_empty() => {
            format!("{}-{}-{}", year, month, day)
        }
        [year, month, ..] if !month.is_empty() => format!("{}-{}", year, month),
        [year, ..] => year.to_string(),
        [] => String::new(),
    }
}

struct Record {
    item: Item,
    start_page: Option<String>,
    end_page: Option<String>,
}

impl Record {
    fn new(ty: &str) -> Self {
        Self {
            item: Item::new(item_type_for(ty)),
            start_page: None,
            end_page: None,
        }
    }

    fn apply(&mut self, tag: &str, value: &str) {
        let item = &mut self.item;
        if let Some(role) = creator_type_for(tag) {
            item.creators.push(Creator::parse(role, value));
            return;
        }
        match tag {
            "TI" | "T1" => item.set("title", value),
            "T2" | "JO" | "JF" | "BT" => {
                let key = match item.item_type.as_str() {
                    "bookSection" => "bookTitle",
                    "conferencePaper" => "proceedingsTitle",
                    "book" | "report" | "thesis" => "series",
                    _ => "publicationTitle",
                };
                if item.get(key).is_none() {
                    item.set(key, value);
                }
            }
            "JA" | "J2" => item.set("journalAbbreviation", value),
            "PY" | "Y1" => {
                if item.get("date").is_none() {
                    item.set("date", &parse_date(value));
                }
            }
            "DA" => item.set("date", &parse_date(value)),
            "VL" => item.set("volume", value),
            "IS" => item.set("issue", value),
            "SP" => self.start_page = Some(value.to_string()),
            "EP" => self.end_page = Some(value.to_string()),
            "PB" => item.set("publisher", value),
            "CY" => item.set("place", value),
            "SN" => {
                let key = if is_valid_isbn(&value.replace('-', "")) {
                    "ISBN"
                } else {
                    "ISSN"
                };
                item.set(key, value);
            }
            "DO" => item.set("DOI", value),
            "UR" => item.set("url", value),
            "AB" | "N2" => {
                if item.get("abstractNote").is_none() {
                    item.set("abstractNote", value);
                }
            }
            "KW" => item.tags.push(Tag::new(value)),
            "N1" => item.notes.push(value.to_string()),
            "LA" => item.set("language", value),
            "ET" => item.set("edition", value),
            _ => tracing::trace!(tag, "ignoring unmapped RIS tag"),
        }
    }

    fn finish(mut self) -> Item {
        let pages = match (self.start_page, self.end_page) {
            (Some(sp), Some(ep)) if sp != ep => format!("{}-{}", sp, ep),
            (Some(sp), _) => sp,
            (None, Some(ep)) => ep,
            (None, None) => String::new(),
        };
        self.item.set("pages", &pages);
        self.item
    }
}

/// Parse RIS into items.
pub fn import(text: &str) -> Result<Vec<Item>, ImportError> {
    let mut items = Vec::new();
    let mut current: Option<Record> = None;
    let mut last_tag: Option<String> = None;
    let mut last_position = Position { line: 1, column: 1 };

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        let position = Position {
            line: index + 1,
            column: 1,
        };
        last_position = position;
        if line.trim().is_empty() {
            continue;
        }

        let Some(caps) = TAG_RE.captures(line) else {
            // Continuation of a wrapped value.
            match (&mut current, last_tag.as_deref()) {
                (Some(record), Some(tag)) => {
                    let tag = tag.to_string();
                    let continued = continue_value(record, &tag, line.trim());
                    if !continued {
                        return Err(ImportError::at("unexpected text in RIS record", position));
                    }
                    continue;
                }
                _ => return Err(ImportError::at("expected a RIS tag line", position)),
            }
        };
        let tag = caps.get(1).map_or("", |m| m.as_str());
        let value = caps.get(2).map_or("", |m| m.as_str()).trim();

        match (tag, current.take()) {
            ("TY", None) => current = Some(Record::new(value)),
            ("TY", Some(_)) => {
                return Err(ImportError::at("TY before the previous record's ER", position));
            }
            ("ER", Some(record)) => items.push(record.finish()),
            ("ER", None) => return Err(ImportError::at("ER without a matching TY", position)),
            (_, None) => return Err(ImportError::at("tag outside of a TY/ER record", position)),
            (_, Some(mut record)) => {
                record.apply(tag, value);
                current = Some(record);
            }
        }
        last_tag = Some(tag.to_string());
    }

    if current.is_some() {
        return Err(ImportError::at("record is missing its ER line", last_position));
    }
    if items.is_empty() && !text.trim().is_empty() {
        return Err(ImportError::new("no RIS records found"));
    }
    Ok(items)
}

/// Append a wrapped line to the last value written under `tag`.
fn continue_value(record: &mut Record, tag: &str, more: &str) -> bool {
    let key = match tag {
        "TI" | "T1" => "title",
        "AB" | "N2" => "abstractNote",
        "N1" => {
            if let Some(note) = record.item.notes.last_mut() {
                note.push(' ');
                note.push_str(more);
                return true;
            }
            return false;
        }
        _ => return false,
    };
    let joined = match record.item.get(key) {
        Some(existing) => format!("{} {}", existing, more),
        None => more.to_string(),
    };
    record.item.set(key, &joined);
    true
}

fn tag_for(creator_type: &str) -> &'static str {
    match creator_type {
        "editor" => "ED",
        "seriesEditor" => "A3",
        "translator" => "A4",
        _ => "AU",
    }
}

fn creator_value(creator: &Creator) -> String {
    match &creator.name {
        CreatorName::Single { name } => name.clone(),
        CreatorName::Split {
            first_name,
            last_name,
        } if first_name.is_empty() => last_name.clone(),
        CreatorName::Split {
            first_name,
            last_name,
        } => format!("{}, {}", last_name, first_name),
    }
}

fn export_record(item: &Item, out: &mut String) {
    let mut line = |tag: &str, value: &str| {
        if !value.is_empty() {
            out.push_str(tag);
            out.push_str("  - ");
            out.push_str(&value.replace(['\r', '\n'], " "));
            out.push_str("\r\n");
        }
    };
    let get = |key: &str| item.get(key).unwrap_or_default();

    line("TY", ris_type_for(&item.item_type));
    line("TI", get("title"));
    for creator in &item.creators {
        line(tag_for(&creator.creator_type), &creator_value(creator));
    }
    let secondary = match item.item_type.as_str() {
        "book" | "report" | "thesis" => item.get("series"),
        _ => ["publicationTitle", "bookTitle", "proceedingsTitle"]
            .iter()
            .find_map(|k| item.get(k)),
    };
    line("T2", secondary.unwrap_or_default());
    line("J2", get("journalAbbreviation"));
    if let Some(year) = item.year() {
        line("PY", year);
    }
    if let Some(date) = item.get("date") {
        line("DA", &date.replace('-', "/"));
    }
    line("VL", get("volume"));
    line("IS", get("issue"));
    if let Some(pages) = item.get("pages") {
        match pages.split_once('-') {
            Some((sp, ep)) => {
                line("SP", sp.trim());
                line("EP", ep.trim());
            }
            None => line("SP", pages),
        }
    }
    line("PB", get("publisher"));
    line("CY", get("place"));
    line("SN", get("ISBN"));
    line("SN", get("ISSN"));
    line("DO", get("DOI"));
    line("UR", get("url"));
    line("AB", get("abstractNote"));
    for tag in &item.tags {
        line("KW", &tag.tag);
    }
    for note in &item.notes {
        line("N1", note);
    }
    line("LA", get("language"));
    line("ET", get("edition"));
    out.push_str("ER  - \r\n");
}

/// Serialize items as RIS with CRLF line endings.
pub fn export(items: &[Item]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        export_record(item, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "TY  - JOUR\r\n\
TI  - Song learning in birds\r\n\
AU  - Marler, Peter\r\n\
AU  - Tamura, Miwako\r\n\
ED  - Hinde, Robert\r\n\
JO  - Science\r\n\
PY  - 1964/12/18/\r\n\
VL  - 146\r\n\
IS  - 3650\r\n\
SP  - 1483\r\n\
EP  - 1486\r\n\
SN  - 0036-8075\r\n\
DO  - 10.1126/science.146.3650.1483\r\n\
AB  - Sparrows learn\r\n\
  their songs.\r\n\
KW  - birdsong\r\n\
KW  - learning\r\n\
N1  - Classic\r\n\
ER  - \r\n";

    #[test]
    fn imports_a_journal_article() {
        let items = import(SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.item_type, "journalArticle");
        assert_eq!(item.title(), Some("Song learning in birds"));
        let names: Vec<_> = item
            .creators
            .iter()
            .map(|c| (c.creator_type.as_str(), c.last_name()))
            .collect();
        assert_eq!(
            names,
            vec![("author", "Marler"), ("author", "Tamura"), ("editor", "Hinde")]
        );
        assert_eq!(item.get("publicationTitle"), Some("Science"));
        assert_eq!(item.get("date"), Some("1964-12-18"));
        assert_eq!(item.get("pages"), Some("1483-1486"));
        assert_eq!(item.get("ISSN"), Some("0036-8075"));
        assert_eq!(item.get("abstractNote"), Some("Sparrows learn their songs."));
        assert_eq!(item.tags.len(), 2);
        assert_eq!(item.notes, vec!["Classic".to_string()]);
    }

    #[test]
    fn isbns_are_told_apart_from_issns() {
        let items = import("TY  - BOOK\nTI  - Walden\nSN  - 978-0-19-929115-1\nER  - \n").unwrap();
        assert_eq!(items[0].get("ISBN"), Some("978-0-19-929115-1"));
    }

    #[test]
    fn unterminated_records_are_errors() {
        let err = import("TY  - JOUR\nTI  - Dangling\n").unwrap_err();
        assert_eq!(err.position.map(|p| p.line), Some(2));
    }

    #[test]
    fn tags_outside_records_are_errors() {
        let err = import("TI  - Orphan\n").unwrap_err();
        assert_eq!(err.position, Some(Position { line: 1, column: 1 }));
    }

    #[test]
    fn export_reimports_to_the_same_fields() {
        let items = import(SAMPLE).unwrap();
        let text = export(&items);
        assert!(text.starts_with("TY  - JOUR\r\nTI  - Song learning in birds\r\n"));
        assert!(text.ends_with("ER  - \r\n"));
        let again = import(&text).unwrap();
        assert_eq!(again, items);
    }
}
