//! ISBN lookup through the Open Library books API.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::TranslatorEngine;
use crate::error::TranslatorError;
use crate::identifiers::Scheme;
use crate::item::{Creator, Item, Tag};
use crate::sandbox::{Context, Input};

const DEFAULT_API: &str = "https://openlibrary.org/api/books";

pub struct Isbn;

fn first_name(value: &Value) -> Option<&str> {
    value.get(0)?["name"].as_str()
}

fn book_to_item(book: &Value, isbn: &str) -> Item {
    let mut item = Item::new("book");

    let title = book["title"].as_str().unwrap_or("");
    match book["subtitle"].as_str() {
        Some(sub) if !sub.trim().is_empty() => item.set("title", &format!("{}: {}", title, sub)),
        _ => item.set("title", title),
    }
    if let Some(authors) = book["authors"].as_array() {
        item.creators.extend(
            authors
                .iter()
                .filter_map(|a| a["name"].as_str())
                .map(|name| Creator::parse("author", name)),
        );
    }
    if let Some(publisher) = first_name(&book["publishers"]) {
        item.set("publisher", publisher);
    }
    if let Some(place) = first_name(&book["publish_places"]) {
        item.set("place", place);
    }
    if let Some(date) = book["publish_date"].as_str() {
        item.set("date", date);
    }
    if let Some(pages) = book["number_of_pages"].as_u64() {
        item.set("numPages", &pages.to_string());
    }
    if let Some(url) = book["url"].as_str() {
        item.set("url", url);
    }
    if let Some(subjects) = book["subjects"].as_array() {
        item.tags.extend(
            subjects
                .iter()
                .filter_map(|s| s["name"].as_str())
                .map(Tag::new),
        );
    }
    item.set("ISBN", isbn);
    item.set("libraryCatalog", "Open Library");
    item
}

impl TranslatorEngine for Isbn {
    fn name(&self) -> &str {
        "isbn"
    }

    fn run<'a>(
        &'a self,
        ctx: &'a mut Context,
        input: &'a Input,
    ) -> Pin<Box<dyn Future<Output = Result<(), TranslatorError>> + Send + 'a>> {
        Box::pin(async move {
            let Input::Search(id) = input else {
                return Err(ctx.error("ISBN lookup needs an identifier"));
            };
            if id.scheme != Scheme::Isbn {
                return Err(ctx.error(format!("not an ISBN: {}", id)));
            }

            let api = ctx
                .payload()
                .get("api")
                .and_then(toml::Value::as_str)
                .unwrap_or(DEFAULT_API);
            let key = format!("ISBN:{}", id.value);
            let url = format!("{}?bibkeys={}&format=json&jscmd=data", api, key);
            let document = ctx.fetch_url(&url).await?;
            let data = ctx.json(&document)?;

            let book = &data[key.as_str()];
            if !book.is_object() || book["title"].as_str().is_none() {
                return Err(ctx.error(format!("Open Library has no record for {}", id.value)));
            }
            let item = book_to_item(book, &id.value);
            ctx.emit(item)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_library_record() {
        let book = json!({
            "title": "The Selfish Gene",
            "subtitle": "30th anniversary edition",
            "authors": [{"name": "Richard Dawkins"}],
            "publishers": [{"name": "Oxford University Press"}],
            "publish_places": [{"name": "Oxford"}],
            "publish_date": "2006",
            "number_of_pages": 360,
            "subjects": [{"name": "Genetics"}, {"name": "Evolution"}]
        });
        let item = book_to_item(&book, "9780199291151");
        assert_eq!(item.title(), Some("The Selfish Gene: 30th anniversary edition"));
        assert_eq!(item.get("publisher"), Some("Oxford University Press"));
        assert_eq!(item.get("place"), Some("Oxford"));
        assert_eq!(item.get("numPages"), Some("360"));
        assert_eq!(item.get("ISBN"), Some("9780199291151"));
        assert_eq!(item.creators[0].last_name(), "Dawkins");
        assert_eq!(item.tags.len(), 2);
    }
}
