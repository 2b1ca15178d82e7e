//! Translator engines: the Rust code that interprets a translator's payload.

pub mod arxiv;
pub mod doi;
pub mod embedded;
pub mod isbn;
pub mod pubmed;
pub mod scrape;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::error::TranslatorError;
use crate::sandbox::{Context, Input};

/// What a web engine found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detected {
    /// One item of the given item type.
    Single(String),
    /// A listing the caller has to choose from.
    Multiple,
}

/// An engine runs translators that share one implementation but differ in
/// their declarative payload.
pub trait TranslatorEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Check a translator payload at load time.
    fn validate(&self, _payload: &toml::Table) -> Result<(), String> {
        Ok(())
    }

    /// Engine-level web detection on an already parsed page. Engines that only
    /// serve search translators never match.
    fn detect_web(&self, _payload: &toml::Table, _url: &str, _page: &Html) -> Option<Detected> {
        None
    }

    /// Run the translator. Output goes through the context.
    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>>;
}

/// The engines available to a registry and sandbox.
#[derive(Clone, Default)]
pub struct EngineSet {
    engines: HashMap<String, Arc<dyn TranslatorEngine>>,
}

impl EngineSet {
    /// No engines at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All built-in engines.
    pub fn builtin() -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(scrape::Scrape));
        set.register(Arc::new(embedded::EmbeddedMetadata));
        set.register(Arc::new(doi::Doi));
        set.register(Arc::new(arxiv::Arxiv));
        set.register(Arc::new(pubmed::PubMed));
        set.register(Arc::new(isbn::Isbn));
        set
    }

    /// Add or replace an engine under its own name.
    pub fn register(&mut self, engine: Arc<dyn TranslatorEngine>) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TranslatorEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.engines.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.engines.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSet")
            .field("engines", &self.names())
            .finish()
    }
}

// -- HTML helpers shared by the web engines --------------------------------

/// Collapsed text content of an element.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    crate::text::collapse_whitespace(&el.text().collect::<String>())
}

/// `content` of every `<meta>` whose `name` or `property` equals `key`
/// (case-insensitive), in document order.
pub(crate) fn meta_values(page: &Html, key: &str) -> Vec<String> {
    static META: Lazy<Selector> = Lazy::new(|| Selector::parse("meta[content]").unwrap());
    page.select(&META)
        .filter(|m| {
            let v = m.value();
            v.attr("name")
                .or_else(|| v.attr("property"))
                .is_some_and(|n| n.eq_ignore_ascii_case(key))
        })
        .filter_map(|m| m.value().attr("content"))
        .map(crate::text::collapse_whitespace)
        .filter(|c| !c.is_empty())
        .collect()
}

pub(crate) fn meta_first(page: &Html, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| meta_values(page, k).into_iter().next())
}

/// Resolve `href` against `base`.
pub(crate) fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = reqwest::Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_set_has_all_engines() {
        let set = EngineSet::builtin();
        assert_eq!(
            set.names(),
            vec!["arxiv", "doi", "embedded-metadata", "isbn", "pubmed", "scrape"]
        );
        assert!(set.get("nope").is_none());
    }

    #[test]
    fn meta_lookup_is_case_insensitive_and_ordered() {
        let page = Html::parse_document(
            r#"<html><head>
            <meta name="citation_author" content="Doe, Jane">
            <meta name="CITATION_AUTHOR" content=" Roe,  Richard ">
            <meta property="og:title" content="OG">
            </head></html>"#,
        );
        assert_eq!(
            meta_values(&page, "citation_author"),
            vec!["Doe, Jane", "Roe, Richard"]
        );
        assert_eq!(meta_first(&page, &["dc.title", "og:title"]).as_deref(), Some("OG"));
    }

    #[test]
    fn relative_links_resolve() {
        assert_eq!(
            absolute_url("https://a.test/list?page=2", "/article/7").as_deref(),
            Some("https://a.test/article/7")
        );
    }
}
