//! Generic extraction from embedded page metadata: Highwire Press
//! (`citation_*`), Dublin Core (`dc.*`) and OpenGraph (`og:*`) meta tags.

use std::future::Future;
use std::pin::Pin;

use scraper::Html;

use super::{Detected, TranslatorEngine, meta_first, meta_values};
use crate::error::TranslatorError;
use crate::identifiers::{Identifier, Scheme};
use crate::item::{Attachment, Creator, Item, Tag, schema};
use crate::sandbox::{Context, Input};

pub struct EmbeddedMetadata;

const TITLE_KEYS: &[&str] = &["citation_title", "dc.title", "og:title"];

/// Item type implied by which Highwire fields are present.
fn infer_type(page: &Html, default_type: &str) -> String {
    let has = |key: &str| !meta_values(page, key).is_empty();
    let item_type = if has("citation_journal_title") {
        "journalArticle"
    } else if has("citation_conference_title") || has("citation_conference") {
        "conferencePaper"
    } else if has("citation_inbook_title") || has("citation_book_title") {
        "bookSection"
    } else if has("citation_dissertation_institution") {
        "thesis"
    } else if has("citation_technical_report_institution") {
        "report"
    } else if has("citation_isbn") {
        "book"
    } else {
        default_type
    };
    item_type.to_string()
}

fn default_type(payload: &toml::Table) -> &str {
    payload
        .get("default_type")
        .and_then(toml::Value::as_str)
        .unwrap_or("webpage")
}

/// Highwire first page / last page into a `pages` range.
fn pages(page: &Html) -> Option<String> {
    let first = meta_first(page, &["citation_firstpage"])?;
    Some(match meta_first(page, &["citation_lastpage"]) {
        Some(last) if last != first => format!("{}-{}", first, last),
        _ => first,
    })
}

fn doi(page: &Html) -> Option<String> {
    meta_first(page, &["citation_doi"]).or_else(|| {
        meta_values(page, "dc.identifier")
            .iter()
            .filter_map(|v| Identifier::classify(v))
            .find(|id| id.scheme == Scheme::Doi)
            .map(|id| id.value)
    })
}

fn extract(page: &Html, url: &str, default_type: &str) -> Option<Item> {
    let title = meta_first(page, TITLE_KEYS)?;
    let mut item = Item::new(&infer_type(page, default_type));
    item.set("title", &title);

    let mut authors = meta_values(page, "citation_author");
    if authors.is_empty() {
        authors = meta_values(page, "dc.creator");
    }
    item.creators
        .extend(authors.iter().map(|a| Creator::parse("author", a)));
    for editor in meta_values(page, "citation_editor") {
        item.creators.push(Creator::parse("editor", &editor));
    }

    if let Some(date) = meta_first(
        page,
        &["citation_publication_date", "citation_date", "dc.date", "article:published_time"],
    ) {
        item.set("date", &date.replace('/', "-"));
    }

    let container = meta_first(page, &["citation_journal_title"]);
    match item.item_type.as_str() {
        "conferencePaper" => {
            if let Some(t) =
                meta_first(page, &["citation_conference_title", "citation_conference"])
            {
                item.set("proceedingsTitle", &t);
            }
        }
        "bookSection" => {
            if let Some(t) = meta_first(page, &["citation_inbook_title", "citation_book_title"]) {
                item.set("bookTitle", &t);
            }
        }
        "webpage" => {
            if let Some(site) = meta_first(page, &["og:site_name"]) {
                item.set("websiteTitle", &site);
            }
        }
        _ => {
            if let Some(t) = container {
                item.set("publicationTitle", &t);
            }
        }
    }

    let simple: &[(&str, &[&str])] = &[
        ("journalAbbreviation", &["citation_journal_abbrev"]),
        ("volume", &["citation_volume"]),
        ("issue", &["citation_issue"]),
        ("ISSN", &["citation_issn"]),
        ("ISBN", &["citation_isbn"]),
        ("publisher", &["citation_publisher", "dc.publisher"]),
        ("language", &["citation_language", "dc.language"]),
        ("abstractNote", &["citation_abstract", "dc.description", "og:description", "description"]),
        ("reportNumber", &["citation_technical_report_number"]),
    ];
    for (field, keys) in simple {
        if let Some(value) = meta_first(page, keys) {
            item.set(field, &value);
        }
    }
    match item.item_type.as_str() {
        "thesis" => {
            if let Some(u) = meta_first(page, &["citation_dissertation_institution"]) {
                item.set("university", &u);
            }
        }
        "report" => {
            if let Some(i) = meta_first(page, &["citation_technical_report_institution"]) {
                item.set("institution", &i);
            }
        }
        _ => {}
    }
    if let Some(pages) = pages(page) {
        item.set("pages", &pages);
    }
    if let Some(doi) = doi(page) {
        item.set("DOI", &doi);
    }

    for keywords in meta_values(page, "citation_keywords") {
        item.tags.extend(
            keywords
                .split(';')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Tag::new),
        );
    }
    if let Some(pdf) = meta_first(page, &["citation_pdf_url"]) {
        item.attachments.push(Attachment {
            title: "Full Text PDF".into(),
            url: Some(pdf),
            mime_type: Some("application/pdf".into()),
        });
    }

    let canonical = meta_first(
        page,
        &["citation_public_url", "citation_abstract_html_url", "og:url"],
    );
    item.set("url", canonical.as_deref().unwrap_or(url));
    Some(item)
}

impl TranslatorEngine for EmbeddedMetadata {
    fn name(&self) -> &str {
        "embedded-metadata"
    }

    fn validate(&self, payload: &toml::Table) -> Result<(), String> {
        let t = default_type(payload);
        if schema::is_item_type(t) {
            Ok(())
        } else {
            Err(format!("unknown default_type '{}'", t))
        }
    }

    fn detect_web(&self, payload: &toml::Table, _url: &str, page: &Html) -> Option<Detected> {
        meta_first(page, TITLE_KEYS)?;
        Some(Detected::Single(infer_type(page, default_type(payload))))
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>> {
        Box::pin(async move {
            let Input::Web { url, document } = input else {
                return Err(ctx.error("embedded metadata only applies to web pages"));
            };
            let item = {
                let page = Html::parse_document(&document.text());
                extract(&page, url, default_type(ctx.payload()))
            };
            let mut item = item.ok_or_else(|| ctx.error("page has no title metadata"))?;
            if item.get("libraryCatalog").is_none() {
                let host = reqwest::Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(String::from));
                if let Some(host) = host {
                    item.set("libraryCatalog", &host);
                }
            }
            ctx.emit(item)
        })
    }
}
