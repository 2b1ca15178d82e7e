//! BibTeX codec.
//!
//! Import goes through the `biblatex` crate, which decodes LaTeX accents and
//! splits names; export is written by hand so the output stays plain BibTeX.

use once_cell::sync::Lazy;
use regex::Regex;
use scrivener_core::{Creator, CreatorName, Item, Tag};

use crate::{CitationKeys, ImportError, Position};

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*@[a-zA-Z]").unwrap());
static SIGNATURE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*@[a-zA-Z]+\s*[{(]").unwrap());

pub(crate) fn looks_like(text: &str) -> bool {
    SIGNATURE_RE.is_match(text)
}

/// Parse BibTeX into items.
///
/// A file that does not parse as a whole is split on `@type` lines and each
/// entry parsed on its own, so one broken entry does not lose the rest.
pub fn import(text: &str) -> Result<Vec<Item>, ImportError> {
    match biblatex::Bibliography::parse(text) {
        Ok(bibliography) => {
            let items: Vec<Item> = bibliography.iter().map(entry_to_item).collect();
            if items.is_empty() && !text.trim().is_empty() {
                return Err(ImportError::new("no BibTeX entries found"));
            }
            Ok(items)
        }
        Err(e) => {
            let position = Position::at_offset(text, e.span.start);
            tracing::debug!(
                error = %e,
                line = position.line,
                "BibTeX parse failed, retrying per entry"
            );
            import_individually(text).ok_or_else(|| ImportError::at(e.to_string(), position))
        }
    }
}

fn import_individually(text: &str) -> Option<Vec<Item>> {
    let starts: Vec<usize> = ENTRY_RE.find_iter(text).map(|m| m.start()).collect();
    let mut items = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        match biblatex::Bibliography::parse(&text[start..end]) {
            Ok(bibliography) => items.extend(bibliography.iter().map(entry_to_item)),
            Err(e) => {
                let position = Position::at_offset(text, start + e.span.start);
                tracing::warn!(
                    line = position.line,
                    column = position.column,
                    error = %e,
                    "skipping malformed BibTeX entry"
                );
            }
        }
    }
    if items.is_empty() { None } else { Some(items) }
}

fn chunks_to_string(chunks: &[biblatex::Spanned<biblatex::Chunk>]) -> String {
    chunks
        .iter()
        .map(|c| match &c.v {
            biblatex::Chunk::Normal(s) => s.as_str(),
            biblatex::Chunk::Verbatim(s) => s.as_str(),
            biblatex::Chunk::Math(s) => s.as_str(),
        })
        .collect::<String>()
}

fn field(entry: &biblatex::Entry, name: &str) -> Option<String> {
    entry
        .get(name)
        .map(chunks_to_string)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn person_to_creator(creator_type: &str, person: &biblatex::Person) -> Creator {
    let family = [person.prefix.as_str(), person.name.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if person.given_name.is_empty() {
        return Creator::single(creator_type, &family);
    }
    let given = if person.suffix.is_empty() {
        person.given_name.clone()
    } else {
        format!("{}, {}", person.given_name, person.suffix)
    };
    Creator::split(creator_type, &given, &family)
}

fn item_type_for(entry_type: &str, entry: &biblatex::Entry) -> &'static str {
    match entry_type {
        "article" => "journalArticle",
        "book" | "mvbook" | "booklet" | "collection" | "proceedings" => "book",
        "inbook" | "incollection" | "bookinbook" => "bookSection",
        "inproceedings" | "conference" => "conferencePaper",
        "phdthesis" | "mastersthesis" | "thesis" => "thesis",
        "techreport" | "report" => "report",
        "online" | "electronic" | "www" => "webpage",
        "unpublished" => "manuscript",
        "patent" => "patent",
        "software" => "computerProgram",
        "dataset" => "dataset",
        _ => {
            let arxiv = field(entry, "archiveprefix")
                .or_else(|| field(entry, "eprinttype"))
                .is_some_and(|p| p.eq_ignore_ascii_case("arxiv"));
            if arxiv && field(entry, "eprint").is_some() {
                "preprint"
            } else {
                "document"
            }
        }
    }
}

fn entry_to_item(entry: &biblatex::Entry) -> Item {
    let entry_type = entry.entry_type.to_string().to_lowercase();
    let mut item = Item::new(item_type_for(&entry_type, entry));

    if let Some(title) = field(entry, "title") {
        item.set("title", &title);
    }

    for person in entry.author().unwrap_or_default() {
        if person.name == "others" || (person.name.is_empty() && person.given_name.is_empty()) {
            continue;
        }
        item.creators.push(person_to_creator("author", &person));
    }
    for (persons, _) in entry.editors().unwrap_or_default() {
        for person in persons.iter().filter(|p| p.name != "others") {
            item.creators.push(person_to_creator("editor", person));
        }
    }

    if let Some(date) = field(entry, "date") {
        item.set("date", &date);
    } else if let Some(year) = field(entry, "year") {
        match field(entry, "month").and_then(|m| month_number(&m)) {
            Some(month) => item.set("date", &format!("{}-{:02}", year, month)),
            None => item.set("date", &year),
        }
    }

    let container = match item.item_type.as_str() {
        "bookSection" => "bookTitle",
        "conferencePaper" => "proceedingsTitle",
        _ => "publicationTitle",
    };
    if let Some(journal) = field(entry, "journal").or_else(|| field(entry, "journaltitle")) {
        item.set("publicationTitle", &journal);
    }
    if let Some(booktitle) = field(entry, "booktitle") {
        item.set(container, &booktitle);
    }

    let number_key = if item.item_type == "report" {
        "reportNumber"
    } else {
        "issue"
    };
    if let Some(number) = field(entry, "number").or_else(|| field(entry, "issue")) {
        item.set(number_key, &number);
    }
    if let Some(pages) = field(entry, "pages") {
        item.set("pages", &pages.replace("--", "-").replace('\u{2013}', "-"));
    }

    let publisher = match item.item_type.as_str() {
        "thesis" => field(entry, "school").map(|s| ("university", s)),
        "report" => field(entry, "institution").map(|s| ("institution", s)),
        _ => None,
    };
    if let Some((key, value)) = publisher {
        item.set(key, &value);
    }

    for (bib, key) in SIMPLE_FIELDS {
        if let Some(value) = field(entry, bib) {
            item.set(key, &value);
        }
    }

    if item.item_type == "preprint"
        && let Some(eprint) = field(entry, "eprint")
    {
        item.set("archiveID", &format!("arXiv:{}", eprint));
        item.set("repository", "arXiv");
    }

    if let Some(keywords) = field(entry, "keywords") {
        item.tags.extend(
            keywords
                .split([',', ';'])
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Tag::new),
        );
    }
    if let Some(note) = field(entry, "note") {
        item.notes.push(note);
    }
    item
}

/// BibTeX field name to item field, for fields that map one to one.
const SIMPLE_FIELDS: &[(&str, &str)] = &[
    ("volume", "volume"),
    ("publisher", "publisher"),
    ("address", "place"),
    ("edition", "edition"),
    ("series", "series"),
    ("doi", "DOI"),
    ("isbn", "ISBN"),
    ("issn", "ISSN"),
    ("url", "url"),
    ("abstract", "abstractNote"),
    ("language", "language"),
];

fn month_number(raw: &str) -> Option<u32> {
    let raw = raw.trim().to_lowercase();
    if let Ok(n) = raw.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    MONTHS
        .iter()
        .position(|m| raw.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn entry_type_for(item: &Item) -> &'static str {
    match item.item_type.as_str() {
        "journalArticle" | "magazineArticle" | "newspaperArticle" => "article",
        "book" => "book",
        "bookSection" => "incollection",
        "conferencePaper" => "inproceedings",
        "thesis" => "phdthesis",
        "report" => "techreport",
        "manuscript" => "unpublished",
        "webpage" => "online",
        "patent" => "patent",
        "computerProgram" => "software",
        "dataset" => "dataset",
        _ => "misc",
    }
}

/// Escape text for a brace-delimited value.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '{' | '}' | '&' | '%' | '#' | '$' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// URLs and DOIs go out verbatim apart from brace balance.
fn escape_verbatim(value: &str) -> String {
    value.replace('{', "\\{").replace('}', "\\}")
}

fn creator_name(creator: &Creator) -> String {
    match &creator.name {
        CreatorName::Single { name } => format!("{{{}}}", escape(name)),
        CreatorName::Split {
            first_name,
            last_name,
        } => {
            if first_name.is_empty() {
                return escape(last_name);
            }
            match first_name.split_once(", ") {
                Some((given, suffix)) => format!(
                    "{}, {}, {}",
                    escape(last_name),
                    escape(suffix),
                    escape(given)
                ),
                None => format!("{}, {}", escape(last_name), escape(first_name)),
            }
        }
    }
}

fn names(item: &Item, role: &str) -> Option<String> {
    let names: Vec<String> = item
        .creators
        .iter()
        .filter(|c| c.creator_type == role)
        .map(creator_name)
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(names.join(" and "))
    }
}

fn export_entry(item: &Item, key: &str) -> String {
    let mut fields: Vec<(&str, String)> = Vec::new();
    let mut push = |name: &'static str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            fields.push((name, value));
        }
    };

    let text = |k: &str| item.get(k).map(escape);
    push("title", text("title"));
    push("author", names(item, "author"));
    push("editor", names(item, "editor"));
    push("journal", text("publicationTitle"));
    push("booktitle", text("bookTitle").or_else(|| text("proceedingsTitle")));
    push("year", item.year().map(str::to_string));
    let month = item
        .get("date")
        .and_then(|d| d.get(5..7))
        .and_then(|m| m.parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m));
    push("month", month.map(|m| m.to_string()));
    push("volume", text("volume"));
    push("number", text("issue").or_else(|| text("reportNumber")));
    push("pages", item.get("pages").map(|p| escape(&p.replace('-', "--"))));
    push("publisher", text("publisher"));
    push("school", text("university"));
    push("institution", text("institution"));
    push("address", text("place"));
    push("edition", text("edition"));
    push("series", text("series"));
    push("doi", item.get("DOI").map(escape_verbatim));
    push("isbn", text("ISBN"));
    push("issn", text("ISSN"));
    push("url", item.get("url").map(escape_verbatim));
    if let Some(bare) = item.get("archiveID").and_then(|a| a.strip_prefix("arXiv:")) {
        push("eprint", Some(escape_verbatim(bare)));
        push("archiveprefix", Some("arXiv".to_string()));
    }
    push("abstract", text("abstractNote"));
    push("language", text("language"));
    let keywords: Vec<String> = item.tags.iter().map(|t| escape(&t.tag)).collect();
    push("keywords", Some(keywords.join(", ")));
    push("note", item.notes.first().map(|n| escape(n)));

    let mut out = format!("@{}{{{},\n", entry_type_for(item), key);
    for (name, value) in &fields {
        out.push_str(&format!("  {} = {{{}}},\n", name, value));
    }
    out.push_str("}\n");
    out
}

/// Serialize items as BibTeX. Attachments and all but the first note are
/// dropped.
pub fn export(items: &[Item]) -> String {
    let mut keys = CitationKeys::new();
    items
        .iter()
        .map(|item| export_entry(item, &keys.next(item)))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
@article{doe2023,
  title={A Very Important Research Paper Title},
  author={Doe, John and Smith, Jane},
  journal={Journal of Testing},
  year={2023},
  month={mar},
  pages={10--20},
  doi={10.1234/test.2023},
  keywords={testing, papers}
}
"#;

    #[test]
    fn imports_a_basic_article() {
        let items = import(SAMPLE).unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.item_type, "journalArticle");
        assert_eq!(item.title(), Some("A Very Important Research Paper Title"));
        assert_eq!(item.creators[0], Creator::split("author", "John", "Doe"));
        assert_eq!(item.creators[1], Creator::split("author", "Jane", "Smith"));
        assert_eq!(item.get("publicationTitle"), Some("Journal of Testing"));
        assert_eq!(item.get("date"), Some("2023-03"));
        assert_eq!(item.get("pages"), Some("10-20"));
        assert_eq!(item.get("DOI"), Some("10.1234/test.2023"));
        assert_eq!(item.tags, vec![Tag::new("testing"), Tag::new("papers")]);
    }

    #[test]
    fn accents_are_decoded() {
        let bib = r#"@inproceedings{jegou2020,
  title={Radioactive data},
  author={J{\'e}gou, Herv{\'e}},
  booktitle={International Conference on Machine Learning},
  year={2020}
}"#;
        let items = import(bib).unwrap();
        assert_eq!(items[0].item_type, "conferencePaper");
        assert_eq!(
            items[0].get("proceedingsTitle"),
            Some("International Conference on Machine Learning")
        );
        assert!(items[0].creators[0].last_name().contains("gou"));
    }

    #[test]
    fn broken_entries_do_not_lose_the_rest() {
        let bib = "@article{ok1, title={First Paper}, year={2001}}\n\
                   @article{broken, title={Unclosed, year={2002}\n\
                   @book{ok2, title={Second Book}, year={2003}}\n";
        let items = import(bib).unwrap();
        let titles: Vec<_> = items.iter().filter_map(|i| i.title()).collect();
        assert!(titles.contains(&"First Paper"));
        assert!(titles.contains(&"Second Book"));
    }

    #[test]
    fn hopeless_input_reports_a_position() {
        let err = import("@article{broken, title={never closed").unwrap_err();
        assert!(err.position.is_some());
    }

    #[test]
    fn text_without_entries_is_rejected() {
        assert!(import("no entries here").is_err());
        assert!(import("").unwrap().is_empty());
    }

    #[test]
    fn exports_escaped_fields_in_order() {
        let item = Item::new("bookSection")
            .with_field("title", "Birds & Bees")
            .with_field("bookTitle", "Natural History")
            .with_field("date", "1999-07-04")
            .with_field("pages", "1-9")
            .with_creator(Creator::split("author", "Ada", "Lovelace"))
            .with_creator(Creator::single("editor", "Royal Society"));
        let out = export(&[item]);
        assert!(out.starts_with("@incollection{lovelace1999birds,\n"));
        assert!(out.contains("  title = {Birds \\& Bees},\n"));
        assert!(out.contains("  author = {Lovelace, Ada},\n"));
        assert!(out.contains("  editor = {{Royal Society}},\n"));
        assert!(out.contains("  month = {7},\n"));
        assert!(out.contains("  pages = {1--9},\n"));
    }

    #[test]
    fn backslashes_survive_a_round_trip() {
        let item = Item::new("report").with_field("title", r"Paths like C:\data\raw");
        let out = export(&[item]);
        assert!(out.contains(r"title = {Paths like C:\\data\\raw}"), "{out}");
        let back = import(&out).unwrap();
        assert_eq!(back[0].title(), Some(r"Paths like C:\data\raw"));
    }

    #[test]
    fn preprints_carry_their_eprint() {
        let item = Item::new("preprint")
            .with_field("title", "Attention Is All You Need")
            .with_field("archiveID", "arXiv:1706.03762");
        let out = export(&[item]);
        assert!(out.starts_with("@misc{"));
        assert!(out.contains("eprint = {1706.03762}"));
        let back = import(&out).unwrap();
        assert_eq!(back[0].item_type, "preprint");
        assert_eq!(back[0].get("archiveID"), Some("arXiv:1706.03762"));
    }
}
