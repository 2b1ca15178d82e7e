//! Mapping between CSL-JSON records and Items.
//!
//! Used by the DOI engine (content negotiation returns CSL-JSON) and by the
//! `csljson` codec.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};

use crate::item::{Creator, CreatorName, Item, Tag};

/// (CSL type, item type). The first row for an item type wins on export.
const TYPE_MAP: &[(&str, &str)] = &[
    ("article-journal", "journalArticle"),
    ("article-magazine", "magazineArticle"),
    ("article-newspaper", "newspaperArticle"),
    ("book", "book"),
    ("chapter", "bookSection"),
    ("paper-conference", "conferencePaper"),
    ("thesis", "thesis"),
    ("report", "report"),
    ("webpage", "webpage"),
    ("post-weblog", "blogPost"),
    ("post", "forumPost"),
    ("dataset", "dataset"),
    ("patent", "patent"),
    ("manuscript", "manuscript"),
    ("motion_picture", "film"),
    ("song", "audioRecording"),
    ("speech", "presentation"),
    ("entry-encyclopedia", "encyclopediaArticle"),
    ("entry-dictionary", "dictionaryEntry"),
    ("legal_case", "case"),
    ("legislation", "statute"),
    ("map", "map"),
    ("interview", "interview"),
    ("personal_communication", "letter"),
    ("software", "computerProgram"),
    ("standard", "standard"),
    ("graphic", "artwork"),
    ("article", "preprint"),
    ("proceedings-article", "conferencePaper"),
    ("journal-article", "journalArticle"),
    ("book-chapter", "bookSection"),
    ("posted-content", "preprint"),
    ("document", "document"),
];

/// (CSL variable, item field) for plain string variables.
const FIELD_MAP: &[(&str, &str)] = &[
    ("title", "title"),
    ("title-short", "shortTitle"),
    ("volume", "volume"),
    ("issue", "issue"),
    ("page", "pages"),
    ("publisher", "publisher"),
    ("publisher-place", "place"),
    ("DOI", "DOI"),
    ("ISBN", "ISBN"),
    ("ISSN", "ISSN"),
    ("URL", "url"),
    ("abstract", "abstractNote"),
    ("language", "language"),
    ("collection-title", "series"),
    ("edition", "edition"),
    ("number-of-pages", "numPages"),
    ("genre", "genre"),
    ("archive", "archive"),
    ("note", "extra"),
];

const CREATOR_ROLES: &[(&str, &str)] = &[
    ("author", "author"),
    ("editor", "editor"),
    ("translator", "translator"),
];

pub fn item_type_for(csl_type: &str) -> &'static str {
    TYPE_MAP
        .iter()
        .find(|(c, _)| *c == csl_type)
        .map(|(_, i)| *i)
        .unwrap_or("document")
}

pub fn csl_type_for(item_type: &str) -> &'static str {
    TYPE_MAP
        .iter()
        .find(|(_, i)| *i == item_type)
        .map(|(c, _)| *c)
        .unwrap_or("document")
}

/// Item field the CSL `container-title` maps to for an item type.
fn container_field(item_type: &str) -> &'static str {
    match item_type {
        "bookSection" => "bookTitle",
        "conferencePaper" => "proceedingsTitle",
        "blogPost" => "blogTitle",
        "webpage" => "websiteTitle",
        "encyclopediaArticle" => "encyclopediaTitle",
        "dictionaryEntry" => "dictionaryTitle",
        _ => "publicationTitle",
    }
}

const CONTAINER_FIELDS: &[&str] = &[
    "publicationTitle",
    "bookTitle",
    "proceedingsTitle",
    "blogTitle",
    "websiteTitle",
    "encyclopediaTitle",
    "dictionaryTitle",
];

/// CSL values are sometimes arrays (Crossref titles) or numbers (volumes).
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(arr) => arr.first().and_then(value_text),
        _ => None,
    }
}

fn creator_from_csl(role: &str, value: &Value) -> Option<Creator> {
    if let Some(family) = value["family"].as_str() {
        let given = value["given"].as_str().unwrap_or("");
        let family = match value["non-dropping-particle"].as_str() {
            Some(particle) => format!("{} {}", particle, family),
            None => family.to_string(),
        };
        return Some(Creator::split(role, given, &family));
    }
    value["literal"]
        .as_str()
        .or_else(|| value["name"].as_str())
        .map(|name| Creator::single(role, name))
}

/// Render a CSL date object as `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
fn date_from_csl(value: &Value) -> Option<String> {
    if let Some(parts) = value["date-parts"].get(0).and_then(Value::as_array) {
        let nums: Vec<i64> = parts
            .iter()
            .filter_map(|p| p.as_i64().or_else(|| p.as_str().and_then(|s| s.parse().ok())))
            .collect();
        return match nums.as_slice() {
            [y] => Some(format!("{:04}", y)),
            [y, m] => Some(format!("{:04}-{:02}", y, m)),
            [y, m, d, ..] => Some(format!("{:04}-{:02}-{:02}", y, m, d)),
            [] => None,
        };
    }
    value["raw"]
        .as_str()
        .or_else(|| value["literal"].as_str())
        .map(String::from)
}

fn date_to_csl(date: &str) -> Value {
    static ISO_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^(\d{4})(?:-(\d{1,2}))?(?:-(\d{1,2}))?$").unwrap());
    match ISO_RE.captures(date.trim()) {
        Some(caps) => {
            let parts: Vec<Value> = caps
                .iter()
                .skip(1)
                .flatten()
                .filter_map(|m| m.as_str().parse::<i64>().ok())
                .map(Value::from)
                .collect();
            json!({ "date-parts": [parts] })
        }
        None => json!({ "raw": date }),
    }
}

/// Build an Item from one CSL-JSON record.
pub fn item_from_csl(value: &Value) -> Item {
    let csl_type = value["type"].as_str().unwrap_or("document");
    let mut item = Item::new(item_type_for(csl_type));

    for (csl, field) in FIELD_MAP {
        if let Some(text) = value.get(*csl).and_then(value_text) {
            item.set(field, &text);
        }
    }
    if let Some(container) = value.get("container-title").and_then(value_text) {
        let field = container_field(&item.item_type);
        item.set(field, &container);
    }
    if let Some(short) = value.get("container-title-short").and_then(value_text) {
        item.set("journalAbbreviation", &short);
    }
    if let Some(date) = value.get("issued").and_then(date_from_csl) {
        item.set("date", &date);
    }
    if let Some(date) = value.get("accessed").and_then(date_from_csl) {
        item.set("accessDate", &date);
    }

    for (csl_role, role) in CREATOR_ROLES {
        if let Some(people) = value[*csl_role].as_array() {
            item.creators
                .extend(people.iter().filter_map(|p| creator_from_csl(role, p)));
        }
    }

    if let Some(keywords) = value["keyword"].as_str() {
        item.tags.extend(
            keywords
                .split([',', ';'])
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Tag::new),
        );
    }
    item
}

/// Render an Item as a CSL-JSON record with the given citation id.
///
/// Creators outside author/editor/translator are dropped.
pub fn item_to_csl(item: &Item, id: &str) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), Value::from(id));
    out.insert("type".into(), Value::from(csl_type_for(&item.item_type)));

    for (csl, field) in FIELD_MAP {
        if let Some(text) = item.get(field) {
            out.insert((*csl).into(), Value::from(text));
        }
    }
    if let Some(container) = CONTAINER_FIELDS.iter().find_map(|f| item.get(f)) {
        out.insert("container-title".into(), Value::from(container));
    }
    if let Some(short) = item.get("journalAbbreviation") {
        out.insert("container-title-short".into(), Value::from(short));
    }
    if let Some(date) = item.get("date") {
        out.insert("issued".into(), date_to_csl(date));
    }
    if let Some(date) = item.get("accessDate") {
        out.insert("accessed".into(), date_to_csl(date));
    }

    for (csl_role, role) in CREATOR_ROLES {
        let people: Vec<Value> = item
            .creators
            .iter()
            .filter(|c| c.creator_type == *role)
            .map(|c| match &c.name {
                CreatorName::Split {
                    first_name,
                    last_name,
                } if first_name.is_empty() => json!({ "family": last_name }),
                CreatorName::Split {
                    first_name,
                    last_name,
                } => json!({ "family": last_name, "given": first_name }),
                CreatorName::Single { name } => json!({ "literal": name }),
            })
            .collect();
        if !people.is_empty() {
            out.insert((*csl_role).into(), Value::Array(people));
        }
    }

    if !item.tags.is_empty() {
        let keywords: Vec<&str> = item.tags.iter().map(|t| t.tag.as_str()).collect();
        out.insert("keyword".into(), Value::from(keywords.join(", ")));
    }
    Value::Object(out)
}
