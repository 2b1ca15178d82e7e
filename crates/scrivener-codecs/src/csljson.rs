//! CSL-JSON codec, built on the field mapping in `scrivener_core::csl`.

use scrivener_core::Item;
use scrivener_core::csl::{item_from_csl, item_to_csl};
use serde_json::Value;

use crate::{CitationKeys, ImportError, Position};

pub(crate) fn json_error(e: &serde_json::Error) -> ImportError {
    ImportError::at(
        format!("invalid JSON: {}", e),
        Position {
            line: e.line(),
            column: e.column(),
        },
    )
}

/// Parse a CSL-JSON array (or a single record).
pub fn import(text: &str) -> Result<Vec<Item>, ImportError> {
    let value: Value = serde_json::from_str(text).map_err(|e| json_error(&e))?;
    let records = match value {
        Value::Array(records) => records,
        record @ Value::Object(_) => vec![record],
        _ => return Err(ImportError::new("expected an array of CSL-JSON records")),
    };
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            if !record.is_object() {
                return Err(ImportError::new(format!(
                    "record {} is not an object",
                    index + 1
                )));
            }
            Ok(item_from_csl(record))
        })
        .collect()
}

/// Serialize items as a pretty-printed CSL-JSON array.
pub fn export(items: &[Item]) -> String {
    let mut keys = CitationKeys::new();
    let records: Vec<Value> = items
        .iter()
        .map(|item| item_to_csl(item, &keys.next(item)))
        .collect();
    serde_json::to_string_pretty(&Value::Array(records)).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::Creator;

    #[test]
    fn imports_an_array() {
        let text = r#"[{"type": "book", "title": "Walden", "author": [{"family": "Thoreau", "given": "Henry David"}], "issued": {"date-parts": [[1854]]}}]"#;
        let items = import(text).unwrap();
        assert_eq!(items[0].item_type, "book");
        assert_eq!(items[0].creators[0].first_name(), "Henry David");
        assert_eq!(items[0].get("date"), Some("1854"));
    }

    #[test]
    fn syntax_errors_carry_a_position() {
        let err = import("[{\"type\": \"book\",\n  oops}]").unwrap_err();
        assert_eq!(err.position.map(|p| p.line), Some(2));
    }

    #[test]
    fn only_csl_roles_survive_export() {
        let item = Item::new("book")
            .with_field("title", "Walden")
            .with_creator(Creator::split("author", "Henry David", "Thoreau"))
            .with_creator(Creator::split("contributor", "Some", "Helper"));
        let text = export(&[item]);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["id"], "thoreauwalden");
        assert_eq!(value[0]["author"].as_array().map(Vec::len), Some(1));
        assert!(!text.contains("Helper"));
    }
}
