//! arXiv lookup through the export API (Atom feed).

use std::future::Future;
use std::pin::Pin;

use super::TranslatorEngine;
use crate::error::TranslatorError;
use crate::identifiers::Scheme;
use crate::item::{Attachment, Creator, Item, Tag};
use crate::sandbox::{Context, Input};

const DEFAULT_API: &str = "https://export.arxiv.org/api/query";

pub struct Arxiv;

/// One `<entry>` of an arXiv Atom feed.
#[derive(Debug, Default, PartialEq)]
struct Entry {
    title: String,
    summary: String,
    authors: Vec<String>,
    published: String,
    doi: String,
    journal_ref: String,
    categories: Vec<String>,
    pdf: Option<String>,
}

fn attr(e: &quick_xml::events::BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Parse the first entry of an Atom response.
fn parse_entry(xml: &str) -> Result<Option<Entry>, String> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);

    let mut in_entry = false;
    let mut in_author = false;
    let mut field: Option<&'static str> = None;

    let mut entry = Entry::default();
    let mut current_name = String::new();

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"entry" => in_entry = true,
                    b"author" if in_entry => {
                        in_author = true;
                        current_name.clear();
                    }
                    b"name" if in_author => field = Some("name"),
                    b"title" if in_entry => field = Some("title"),
                    b"summary" if in_entry => field = Some("summary"),
                    b"published" if in_entry => field = Some("published"),
                    b"doi" if in_entry => field = Some("doi"),
                    b"journal_ref" if in_entry => field = Some("journal_ref"),
                    _ => {}
                }
            }
            Ok(Event::Empty(ref e)) if in_entry => match e.local_name().as_ref() {
                b"link" => {
                    let is_pdf = attr(e, b"title").as_deref() == Some("pdf")
                        || attr(e, b"type").as_deref() == Some("application/pdf");
                    if is_pdf && entry.pdf.is_none() {
                        entry.pdf = attr(e, b"href");
                    }
                }
                b"category" | b"primary_category" => {
                    if let Some(term) = attr(e, b"term")
                        && !entry.categories.contains(&term)
                    {
                        entry.categories.push(term);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                let target = match field {
                    Some("name") => Some(&mut current_name),
                    Some("title") => Some(&mut entry.title),
                    Some("summary") => Some(&mut entry.summary),
                    Some("published") => Some(&mut entry.published),
                    Some("doi") => Some(&mut entry.doi),
                    Some("journal_ref") => Some(&mut entry.journal_ref),
                    _ => None,
                };
                if let Some(target) = target {
                    target.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"entry" => return Ok(Some(entry)),
                b"author" if in_author => {
                    let name = crate::text::collapse_whitespace(&current_name);
                    if !name.is_empty() {
                        entry.authors.push(name);
                    }
                    in_author = false;
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(format!("XML parse error: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// `2101.00001v2` -> `2101.00001`.
fn strip_version(id: &str) -> &str {
    match id.rfind('v') {
        Some(i) if i + 1 < id.len() && id[i + 1..].chars().all(|c| c.is_ascii_digit()) => &id[..i],
        _ => id,
    }
}

fn entry_to_item(entry: Entry, id: &str) -> Item {
    let bare = strip_version(id);
    let mut item = Item::new("preprint");
    item.set("title", &crate::text::collapse_whitespace(&entry.title));
    item.set("abstractNote", &crate::text::collapse_whitespace(&entry.summary));
    item.set("date", entry.published.get(..10).unwrap_or(&entry.published));
    item.set("archiveID", &format!("arXiv:{}", bare));
    item.set("repository", "arXiv");
    item.set("url", &format!("https://arxiv.org/abs/{}", bare));
    item.set("libraryCatalog", "arXiv.org");

    let doi = entry.doi.trim();
    if doi.is_empty() {
        item.set("DOI", &format!("10.48550/arXiv.{}", bare));
    } else {
        item.set("DOI", doi);
    }
    if !entry.journal_ref.trim().is_empty() {
        item.set("extra", &format!("Journal reference: {}", entry.journal_ref.trim()));
    }

    item.creators
        .extend(entry.authors.iter().map(|a| Creator::parse("author", a)));
    item.tags
        .extend(entry.categories.iter().map(|c| Tag::new(c)));
    if let Some(pdf) = entry.pdf {
        item.attachments.push(Attachment {
            title: "arXiv Fulltext PDF".into(),
            url: Some(pdf),
            mime_type: Some("application/pdf".into()),
        });
    }
    item
}

impl TranslatorEngine for Arxiv {
    fn name(&self) -> &str {
        "arxiv"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>> {
        Box::pin(async move {
            let Input::Search(id) = input else {
                return Err(ctx.error("arXiv lookup needs an identifier"));
            };
            if id.scheme != Scheme::Arxiv {
                return Err(ctx.error(format!("not an arXiv id: {}", id)));
            }

            let api = ctx
                .payload()
                .get("api")
                .and_then(toml::Value::as_str)
                .unwrap_or(DEFAULT_API);
            let url = format!("{}?id_list={}", api, urlencoding::encode(&id.value));
            let document = ctx.fetch_url(&url).await?;

            let entry = parse_entry(&document.text())
                .map_err(|e| TranslatorError::malformed(&ctx.translator().id, e))?;
            match entry {
                Some(entry) if !entry.title.trim().is_empty() && entry.title.trim() != "Error" => {
                    let item = entry_to_item(entry, &id.value);
                    ctx.emit(item)
                }
                _ => Err(ctx.error(format!("arXiv has no record for {}", id.value))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query: id_list=1706.03762</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <published>2017-06-12T17:57:34Z</published>
    <title>Attention Is All
      You Need</title>
    <summary>  The dominant sequence transduction models...  </summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:journal_ref>NeurIPS 2017</arxiv:journal_ref>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1706.03762v7" rel="related" type="application/pdf"/>
    <arxiv:primary_category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_first_entry() {
        let entry = parse_entry(FEED).unwrap().unwrap();
        assert_eq!(crate::text::collapse_whitespace(&entry.title), "Attention Is All You Need");
        assert_eq!(entry.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(entry.categories, vec!["cs.CL", "cs.LG"]);
        assert_eq!(entry.pdf.as_deref(), Some("http://arxiv.org/pdf/1706.03762v7"));
        assert_eq!(entry.journal_ref, "NeurIPS 2017");
    }

    #[test]
    fn entry_maps_to_preprint() {
        let entry = parse_entry(FEED).unwrap().unwrap();
        let item = entry_to_item(entry, "1706.03762v7");
        assert_eq!(item.item_type, "preprint");
        assert_eq!(item.get("archiveID"), Some("arXiv:1706.03762"));
        assert_eq!(item.get("DOI"), Some("10.48550/arXiv.1706.03762"));
        assert_eq!(item.get("date"), Some("2017-06-12"));
        assert_eq!(item.get("extra"), Some("Journal reference: NeurIPS 2017"));
        assert_eq!(item.creators[1].last_name(), "Shazeer");
        assert_eq!(item.attachments.len(), 1);
    }

    #[test]
    fn empty_feed_has_no_entry() {
        assert_eq!(parse_entry("<feed></feed>").unwrap(), None);
    }

    #[test]
    fn version_suffix() {
        assert_eq!(strip_version("2101.00001v12"), "2101.00001");
        assert_eq!(strip_version("2101.00001"), "2101.00001");
        assert_eq!(strip_version("solv-int/9901001"), "solv-int/9901001");
    }
}
