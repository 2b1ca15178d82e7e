//! PubMed lookup through the NCBI E-utilities summary endpoint.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::TranslatorEngine;
use crate::error::TranslatorError;
use crate::identifiers::Scheme;
use crate::item::{Creator, Item};
use crate::sandbox::{Context, Input};

const DEFAULT_API: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esummary.fcgi";

pub struct PubMed;

/// "Smith JA" -> given "JA", family "Smith". Collective names stay whole.
fn author(value: &Value) -> Option<Creator> {
    let name = value["name"].as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    if value["authtype"].as_str() == Some("CollectiveName") {
        return Some(Creator::single("author", name));
    }
    Some(match name.rsplit_once(' ') {
        Some((family, given)) => Creator::split("author", given, family),
        None => Creator::single("author", name),
    })
}

/// "2019/03/05 00:00" -> "2019-03-05".
fn sort_date(raw: &str) -> String {
    let date = raw.split_whitespace().next().unwrap_or("");
    date.replace('/', "-")
}

fn record_to_item(record: &Value, pmid: &str) -> Item {
    let text = |key: &str| record[key].as_str().unwrap_or("").trim().to_string();

    let mut item = Item::new("journalArticle");
    item.set("title", text("title").trim_end_matches('.'));
    item.set("publicationTitle", &text("fulljournalname"));
    item.set("journalAbbreviation", &text("source"));
    item.set("volume", &text("volume"));
    item.set("issue", &text("issue"));
    item.set("pages", &text("pages"));
    item.set("date", &sort_date(&text("sortpubdate")));
    item.set("ISSN", &text("issn"));
    if item.get("ISSN").is_none() {
        item.set("ISSN", &text("essn"));
    }
    if let Some(lang) = record["lang"].get(0).and_then(Value::as_str) {
        item.set("language", lang);
    }

    let doi = record["articleids"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|id| id["idtype"].as_str() == Some("doi"))
        .and_then(|id| id["value"].as_str());
    if let Some(doi) = doi {
        item.set("DOI", doi);
    }

    if let Some(authors) = record["authors"].as_array() {
        item.creators.extend(authors.iter().filter_map(author));
    }

    item.set("extra", &format!("PMID: {}", pmid));
    item.set("url", &format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid));
    item.set("libraryCatalog", "PubMed");
    item
}

impl TranslatorEngine for PubMed {
    fn name(&self) -> &str {
        "pubmed"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>> {
        Box::pin(async move {
            let Input::Search(id) = input else {
                return Err(ctx.error("PubMed lookup needs an identifier"));
            };
            if id.scheme != Scheme::Pmid {
                return Err(ctx.error(format!("not a PMID: {}", id)));
            }

            let api = ctx
                .payload()
                .get("api")
                .and_then(toml::Value::as_str)
                .unwrap_or(DEFAULT_API);
            let url = format!("{}?db=pubmed&id={}&retmode=json", api, id.value);
            let document = ctx.fetch_url(&url).await?;
            let data = ctx.json(&document)?;

            let record = &data["result"][id.value.as_str()];
            if record.is_null() || record.get("error").is_some() {
                return Err(ctx.error(format!("PubMed has no record for {}", id.value)));
            }
            let item = record_to_item(record, &id.value);
            if item.title().is_none() {
                return Err(TranslatorError::malformed(
                    &ctx.translator().id,
                    format!("record {} has no title", id.value),
                ));
            }
            ctx.emit(item)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_record_maps_to_article() {
        let record = json!({
            "uid": "31452104",
            "sortpubdate": "2019/08/26 00:00",
            "source": "Nat Methods",
            "fulljournalname": "Nature methods",
            "title": "A guide to cell atlases.",
            "volume": "16", "issue": "9", "pages": "809-815",
            "lang": ["eng"],
            "issn": "1548-7091",
            "authors": [
                {"name": "Regev A", "authtype": "Author"},
                {"name": "Human Cell Atlas Consortium", "authtype": "CollectiveName"}
            ],
            "articleids": [
                {"idtype": "pubmed", "value": "31452104"},
                {"idtype": "doi", "value": "10.1038/s41592-019-0546-5"}
            ]
        });
        let item = record_to_item(&record, "31452104");
        assert_eq!(item.title(), Some("A guide to cell atlases"));
        assert_eq!(item.get("date"), Some("2019-08-26"));
        assert_eq!(item.get("journalAbbreviation"), Some("Nat Methods"));
        assert_eq!(item.get("DOI"), Some("10.1038/s41592-019-0546-5"));
        assert_eq!(item.get("extra"), Some("PMID: 31452104"));
        assert_eq!(item.creators[0], Creator::split("author", "A", "Regev"));
        assert_eq!(
            item.creators[1],
            Creator::single("author", "Human Cell Atlas Consortium")
        );
    }
}
