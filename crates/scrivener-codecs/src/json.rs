//! Native item JSON, the same shape the server returns.

use scrivener_core::Item;
use serde_json::{Map, Value};

use crate::ImportError;
use crate::csljson::json_error;

/// Keys with structured values in the item model.
const STRUCTURED: &[&str] = &["itemType", "creators", "tags", "notes", "attachments"];

/// Coerce loose field values into strings; nested values are dropped.
fn flatten_fields(record: Map<String, Value>) -> Map<String, Value> {
    record
        .into_iter()
        .filter_map(|(key, value)| {
            if STRUCTURED.contains(&key.as_str()) {
                return Some((key, value));
            }
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    tracing::debug!(field = %key, "dropping non-scalar item field");
                    return None;
                }
            };
            Some((key, Value::String(text)))
        })
        .collect()
}

/// Parse an array of items (or a single item).
pub fn import(text: &str) -> Result<Vec<Item>, ImportError> {
    let value: Value = serde_json::from_str(text).map_err(|e| json_error(&e))?;
    let records = match value {
        Value::Array(records) => records,
        record @ Value::Object(_) => vec![record],
        _ => return Err(ImportError::new("expected an array of items")),
    };

    let mut items = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let Value::Object(record) = record else {
            return Err(ImportError::new(format!(
                "record {} is not an object",
                index + 1
            )));
        };
        let item: Item = serde_json::from_value(Value::Object(flatten_fields(record)))
            .map_err(|e| ImportError::new(format!("record {}: {}", index + 1, e)))?;
        items.push(item);
    }
    Ok(items)
}

pub fn export(items: &[Item]) -> String {
    serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::Creator;

    #[test]
    fn lossless_for_the_item_model() {
        let item = Item::new("journalArticle")
            .with_field("title", "Migration and Memory")
            .with_field("volume", "12")
            .with_creator(Creator::split("author", "Fernando", "Nottebohm"))
            .with_creator(Creator::single("editor", "Editorial Board"));
        let text = export(std::slice::from_ref(&item));
        assert_eq!(import(&text).unwrap(), vec![item]);
    }

    #[test]
    fn scalars_are_stringified_and_nesting_dropped() {
        let text = r#"[{"itemType": "book", "title": "Walden", "numPages": 352,
            "extra": {"nested": true}, "tags": [{"tag": "nature"}]}]"#;
        let items = import(text).unwrap();
        assert_eq!(items[0].get("numPages"), Some("352"));
        assert_eq!(items[0].get("extra"), None);
        assert_eq!(items[0].tags.len(), 1);
    }

    #[test]
    fn missing_item_type_is_an_error() {
        let err = import(r#"[{"title": "Walden"}]"#).unwrap_err();
        assert!(err.reason.starts_with("record 1"));
    }
}
