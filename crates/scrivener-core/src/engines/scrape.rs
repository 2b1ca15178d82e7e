//! Declarative CSS-selector recipes for site-specific pages.
//!
//! ```toml
//! [payload]
//! item_type = "journalArticle"
//! tags = ".keywords li"
//!
//! [payload.fields]
//! title = "h1.article-title"
//! date = "meta[name='dc.date'] @content"
//!
//! [payload.creators]
//! author = ".authors .author"
//!
//! [payload.multiple]
//! rows = "ul.results a.title"
//! ```
//!
//! A rule is a CSS selector, optionally followed by ` @attr` to read an
//! attribute instead of the element text. Listing rows must be links (or
//! contain one); each row becomes a candidate keyed by its absolute URL.

use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{Detected, TranslatorEngine, absolute_url, element_text};
use crate::error::TranslatorError;
use crate::fetch::Document;
use crate::item::{Creator, Item, Tag, schema};
use crate::sandbox::{Context, Input};

pub struct Scrape;

struct Rule {
    selector: Selector,
    attr: Option<String>,
}

impl Rule {
    fn parse(rule_text: &str) -> Result<Rule, String> {
        let (css, attr) = match rule_text.rsplit_once(" @") {
            Some((css, attr)) if !attr.is_empty() && !attr.contains(char::is_whitespace) => {
                (css, Some(attr.to_string()))
            }
            _ => (rule_text, None),
        };
        let selector =
            Selector::parse(css.trim()).map_err(|e| format!("bad selector '{}': {}", css, e))?;
        Ok(Rule { selector, attr })
    }

    fn value(&self, el: &ElementRef<'_>) -> Option<String> {
        let value = match &self.attr {
            Some(attr) => crate::text::collapse_whitespace(el.value().attr(attr)?),
            None => element_text(el),
        };
        (!value.is_empty()).then_some(value)
    }

    fn first(&self, page: &Html) -> Option<String> {
        page.select(&self.selector).find_map(|el| self.value(&el))
    }

    fn all(&self, page: &Html) -> Vec<String> {
        page.select(&self.selector)
            .filter_map(|el| self.value(&el))
            .collect()
    }
}

struct Recipe {
    item_type: String,
    fields: Vec<(String, Rule)>,
    creators: Vec<(String, Rule)>,
    tags: Option<Rule>,
    rows: Option<Rule>,
}

fn rule_table(payload: &toml::Table, key: &str) -> Result<Vec<(String, Rule)>, String> {
    let Some(value) = payload.get(key) else {
        return Ok(Vec::new());
    };
    let table = value
        .as_table()
        .ok_or_else(|| format!("'{}' must be a table", key))?;
    table
        .iter()
        .map(|(name, rule_text)| {
            let rule_text = rule_text
                .as_str()
                .ok_or_else(|| format!("{}.{} must be a selector string", key, name))?;
            Ok((name.clone(), Rule::parse(rule_text)?))
        })
        .collect()
}

impl Recipe {
    fn from_payload(payload: &toml::Table) -> Result<Recipe, String> {
        let item_type = payload
            .get("item_type")
            .and_then(toml::Value::as_str)
            .ok_or("missing item_type")?;
        if !schema::is_item_type(item_type) {
            return Err(format!("unknown item type '{}'", item_type));
        }

        let fields = rule_table(payload, "fields")?;
        if !fields.iter().any(|(name, _)| name == "title") {
            return Err("fields.title is required".into());
        }
        let creators = rule_table(payload, "creators")?;
        if let Some((role, _)) = creators
            .iter()
            .find(|(role, _)| !schema::is_creator_type(role))
        {
            return Err(format!("unknown creator type '{}'", role));
        }

        let tags = match payload.get("tags") {
            Some(v) => Some(Rule::parse(v.as_str().ok_or("tags must be a selector string")?)?),
            None => None,
        };
        let rows = match payload.get("multiple") {
            Some(v) => {
                let rule_text = v
                    .get("rows")
                    .and_then(toml::Value::as_str)
                    .ok_or("multiple.rows must be a selector string")?;
                Some(Rule::parse(rule_text)?)
            }
            None => None,
        };

        Ok(Recipe {
            item_type: item_type.to_string(),
            fields,
            creators,
            tags,
            rows,
        })
    }

    fn extract(&self, url: &str, page: &Html) -> Option<Item> {
        let mut item = Item::new(&self.item_type);
        for (field, rule) in &self.fields {
            if let Some(value) = rule.first(page) {
                item.set(field, &value);
            }
        }
        item.title()?;

        for (role, rule) in &self.creators {
            item.creators
                .extend(rule.all(page).iter().map(|name| Creator::parse(role, name)));
        }
        if let Some(rule) = &self.tags {
            item.tags.extend(rule.all(page).iter().map(|t| Tag::new(t)));
        }
        if item.get("url").is_none() {
            item.set("url", url);
        }
        Some(item)
    }

    fn candidates(&self, url: &str, page: &Html) -> IndexMap<String, String> {
        static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

        let mut found = IndexMap::new();
        let Some(rule) = &self.rows else {
            return found;
        };
        for row in page.select(&rule.selector) {
            let href = row
                .value()
                .attr("href")
                .or_else(|| row.select(&LINK).next().and_then(|a| a.value().attr("href")));
            let (Some(href), Some(title)) = (href, rule.value(&row)) else {
                continue;
            };
            if let Some(link) = absolute_url(url, href) {
                found.entry(link).or_insert(title);
            }
        }
        found
    }

    fn analyze(&self, url: &str, page: &Html) -> PageKind {
        let candidates = self.candidates(url, page);
        let item = self.extract(url, page);
        match item {
            Some(item) if candidates.len() <= 1 => PageKind::Single(item),
            _ if !candidates.is_empty() => PageKind::Listing(candidates),
            _ => PageKind::Nothing,
        }
    }
}

enum PageKind {
    Single(Item),
    Listing(IndexMap<String, String>),
    Nothing,
}

/// Parse and analyze in one synchronous step; the parsed page never lives
/// across an await.
fn analyze_document(recipe: &Recipe, url: &str, document: &Document) -> PageKind {
    let page = Html::parse_document(&document.text());
    recipe.analyze(url, &page)
}

impl TranslatorEngine for Scrape {
    fn name(&self) -> &str {
        "scrape"
    }

    fn validate(&self, payload: &toml::Table) -> Result<(), String> {
        Recipe::from_payload(payload).map(|_| ())
    }

    fn detect_web(&self, payload: &toml::Table, url: &str, page: &Html) -> Option<Detected> {
        let recipe = Recipe::from_payload(payload).ok()?;
        match recipe.analyze(url, page) {
            PageKind::Single(item) => Some(Detected::Single(item.item_type)),
            PageKind::Listing(_) => Some(Detected::Multiple),
            PageKind::Nothing => None,
        }
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>> {
        Box::pin(async move {
            let Input::Web { url, document } = input else {
                return Err(ctx.error("scrape translators only handle web pages"));
            };
            let recipe = Recipe::from_payload(ctx.payload()).map_err(|e| ctx.error(e))?;

            let candidates = match analyze_document(&recipe, url, document) {
                PageKind::Single(item) => {
                    let item = with_catalog(item, ctx);
                    return ctx.emit(item);
                }
                PageKind::Listing(candidates) => candidates,
                PageKind::Nothing => return Err(ctx.error(format!("no item found on {}", url))),
            };

            let Some(selected) = ctx.select(candidates)? else {
                return Ok(());
            };
            let delegate = ctx.translator().capabilities.delegate;
            for link in selected {
                if delegate {
                    ctx.delegate_web(&link).await?;
                    continue;
                }
                let page = ctx.fetch_url(&link).await?;
                match analyze_document(&recipe, &link, &page) {
                    PageKind::Single(item) => {
                        let item = with_catalog(item, ctx);
                        ctx.emit(item)?;
                    }
                    _ => return Err(ctx.error(format!("no item found on {}", link))),
                }
            }
            Ok(())
        })
    }
}

fn with_catalog(mut item: Item, ctx: &Context) -> Item {
    item.set("libraryCatalog", &ctx.translator().label);
    item
}
