//! Detector: which translators apply to an input, best first.
//!
//! Detection never fetches. Web detection works on a document the caller
//! already fetched, parsed once and shared by every rule.

use std::cmp::Ordering;
use std::sync::Arc;

use scraper::Html;
use serde::{Deserialize, Serialize};

use crate::engines::{Detected, EngineSet};
use crate::error::DetectionError;
use crate::fetch::Document;
use crate::identifiers::Identifier;
use crate::registry::RegistrySnapshot;
use crate::translator::{DetectionRule, Specificity, TargetType, Translator};

/// Which ordering key dominates when several translators match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RankingPolicy {
    /// Declared priority, then URL-pattern specificity, then id.
    #[default]
    PriorityFirst,
    /// Specificity, then priority, then id.
    SpecificityFirst,
}

impl RankingPolicy {
    pub fn parse(name: &str) -> Option<RankingPolicy> {
        match name.trim() {
            "priority-first" => Some(RankingPolicy::PriorityFirst),
            "specificity-first" => Some(RankingPolicy::SpecificityFirst),
            _ => None,
        }
    }

    /// Order two translators; "less" ranks first.
    pub fn compare(&self, a: &Translator, b: &Translator) -> Ordering {
        let by_priority = b.priority.cmp(&a.priority);
        let by_specificity = b.specificity().cmp(&a.specificity());
        let primary = match self {
            RankingPolicy::PriorityFirst => by_priority.then(by_specificity),
            RankingPolicy::SpecificityFirst => by_specificity.then(by_priority),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// One applicable translator.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub translator: Arc<Translator>,
    pub priority: i32,
    pub specificity: Specificity,
    pub detected: Detected,
}

#[derive(Debug, Clone, Default)]
pub struct Detector {
    policy: RankingPolicy,
}

impl Detector {
    pub fn new(policy: RankingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RankingPolicy {
        self.policy
    }

    /// All web translators whose rules accept `url` and `document`, ranked.
    /// An empty list means nothing applies.
    pub fn detect_web(
        &self,
        snapshot: &RegistrySnapshot,
        engines: &EngineSet,
        url: &str,
        document: &Document,
    ) -> Vec<Candidate> {
        let text = document.text();
        let page = Html::parse_document(&text);

        let mut candidates: Vec<Candidate> = snapshot
            .by_target(TargetType::Web)
            .filter_map(|translator| {
                let DetectionRule::Web(rule) = &translator.rule else {
                    return None;
                };
                if !translator.matches_url(url) {
                    return None;
                }
                if let Some(selector) = &rule.selector
                    && page.select(selector).next().is_none()
                {
                    return None;
                }
                let engine = engines.get(translator.engine_name()?)?;
                let detected = engine.detect_web(translator.payload()?, url, &page)?;
                Some(Candidate {
                    priority: translator.priority,
                    specificity: rule.specificity,
                    translator: translator.clone(),
                    detected,
                })
            })
            .collect();

        candidates.sort_by(|a, b| self.policy.compare(&a.translator, &b.translator));
        tracing::debug!(
            url,
            candidates = ?candidates.iter().map(|c| c.translator.id.as_str()).collect::<Vec<_>>(),
            "web detection"
        );
        candidates
    }

    /// Classify a bare identifier and return the search translators
    /// registered for its scheme, ranked.
    pub fn detect_identifier(
        &self,
        snapshot: &RegistrySnapshot,
        raw: &str,
    ) -> Result<(Identifier, Vec<Arc<Translator>>), DetectionError> {
        let identifier = Identifier::classify(raw)
            .ok_or_else(|| DetectionError::UnrecognizedIdentifier(raw.trim().to_string()))?;

        let mut translators: Vec<Arc<Translator>> = snapshot
            .by_target(TargetType::Search)
            .filter(|t| t.scheme() == Some(identifier.scheme))
            .cloned()
            .collect();
        if translators.is_empty() {
            return Err(DetectionError::NoTranslator(identifier.to_string()));
        }
        translators.sort_by(|a, b| self.policy.compare(a, b));
        tracing::debug!(
            identifier = %identifier,
            translators = translators.len(),
            "identifier detection"
        );
        Ok((identifier, translators))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RegistrySnapshot, RegistrySource};

    fn web(id: &str, priority: i32, url: &str) -> (String, String) {
        (
            format!("{}.toml", id),
            format!(
                "id = '{id}'\nlabel = '{id}'\ntarget = 'web'\npriority = {priority}\nengine = 'embedded-metadata'\n[detect]\nurl = '{url}'\n"
            ),
        )
    }

    fn snapshot(defs: Vec<(String, String)>) -> RegistrySnapshot {
        RegistrySnapshot::build(&RegistrySource::Inline(defs), &EngineSet::builtin(), None).0
    }

    fn page() -> Document {
        Document::new(
            "https://journal.example.org/article/1",
            "text/html",
            r#"<html><head><meta name="citation_title" content="A Paper"></head></html>"#,
        )
    }

    fn ids(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.translator.id.as_str()).collect()
    }

    #[test]
    fn ranking_policies() {
        let snap = snapshot(vec![
            web("generic", 100, r"^https?://"),
            web("narrow", 100, r"^https?://journal\.example\.org/article/"),
            web("loud", 200, r"^https?://"),
            web("also-generic", 100, r"^https?://"),
        ]);
        let engines = EngineSet::builtin();
        let url = "https://journal.example.org/article/1";

        let by_priority = Detector::new(RankingPolicy::PriorityFirst);
        assert_eq!(
            ids(&by_priority.detect_web(&snap, &engines, url, &page())),
            vec!["loud", "narrow", "also-generic", "generic"]
        );

        let by_specificity = Detector::new(RankingPolicy::SpecificityFirst);
        assert_eq!(
            ids(&by_specificity.detect_web(&snap, &engines, url, &page())),
            vec!["narrow", "loud", "also-generic", "generic"]
        );
    }

    #[test]
    fn url_and_engine_predicates_filter() {
        let snap = snapshot(vec![web("other-site", 100, r"^https://other\.test/")]);
        let d = Detector::default();
        let url = "https://journal.example.org/article/1";
        assert!(d.detect_web(&snap, &EngineSet::builtin(), url, &page()).is_empty());

        // Engine finds no metadata on a bare page.
        let snap = snapshot(vec![web("generic", 100, r"^https?://")]);
        let bare = Document::new("https://x.test/", "text/html", "<html><body>hi</body></html>");
        assert!(d.detect_web(&snap, &EngineSet::builtin(), "https://x.test/", &bare).is_empty());
    }

    #[test]
    fn identifier_detection_errors() {
        let snap = snapshot(vec![]);
        let d = Detector::default();
        assert_eq!(
            d.detect_identifier(&snap, "hello world").unwrap_err(),
            DetectionError::UnrecognizedIdentifier("hello world".into())
        );
        assert!(matches!(
            d.detect_identifier(&snap, "10.1000/xyz").unwrap_err(),
            DetectionError::NoTranslator(_)
        ));
    }
}
