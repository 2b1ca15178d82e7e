//! DOI lookup through content negotiation at a DOI resolver.

use std::future::Future;
use std::pin::Pin;

use super::TranslatorEngine;
use crate::csl::item_from_csl;
use crate::error::TranslatorError;
use crate::fetch::FetchRequest;
use crate::identifiers::Scheme;
use crate::sandbox::{Context, Input};

const CSL_JSON: &str = "application/vnd.citationstyles.csl+json";
const DEFAULT_RESOLVER: &str = "https://doi.org/";

pub struct Doi;

fn resolver(payload: &toml::Table) -> &str {
    payload
        .get("resolver")
        .and_then(toml::Value::as_str)
        .unwrap_or(DEFAULT_RESOLVER)
}

impl TranslatorEngine for Doi {
    fn name(&self) -> &str {
        "doi"
    }

    fn validate(&self, payload: &toml::Table) -> Result<(), String> {
        let r = resolver(payload);
        if r.starts_with("http://") || r.starts_with("https://") {
            Ok(())
        } else {
            Err(format!("resolver must be an http(s) URL, got '{}'", r))
        }
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>> {
        Box::pin(async move {
            let Input::Search(id) = input else {
                return Err(ctx.error("DOI lookup needs an identifier"));
            };
            if id.scheme != Scheme::Doi {
                return Err(ctx.error(format!("not a DOI: {}", id)));
            }

            let url = doi_url(resolver(ctx.payload()), &id.value);
            let document = ctx.fetch(FetchRequest::get(&url).accept(CSL_JSON)).await?;
            let record = ctx.json(&document)?;

            let mut item = item_from_csl(&record);
            if item.title().is_none() {
                return Err(TranslatorError::malformed(
                    &ctx.translator().id,
                    format!("no title in metadata for {}", id.value),
                ));
            }
            if item.get("DOI").is_none() {
                item.set("DOI", &id.value);
            }
            item.set("libraryCatalog", "DOI.org (CSL JSON)");
            ctx.emit(item)
        })
    }
}

/// Percent-encode each path segment of the DOI; the slashes stay.
fn doi_url(resolver: &str, doi: &str) -> String {
    let path: Vec<_> = doi.split('/').map(urlencoding::encode).collect();
    format!("{}{}", resolver, path.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_validation() {
        let engine = Doi;
        assert!(engine.validate(&toml::Table::new()).is_ok());
        let bad: toml::Table = toml::from_str("resolver = 'doi.org'").unwrap();
        assert!(engine.validate(&bad).is_err());
    }

    #[test]
    fn doi_is_encoded_but_keeps_slashes() {
        assert_eq!(
            doi_url("https://doi.org/", "10.2307/4486062"),
            "https://doi.org/10.2307/4486062"
        );
        assert_eq!(
            doi_url("https://doi.org/", "10.1002/(SICI)1097-4571#x?y"),
            "https://doi.org/10.1002/%28SICI%291097-4571%23x%3Fy"
        );
    }
}
