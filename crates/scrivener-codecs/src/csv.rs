//! CSV export with a fixed column set. There is no CSV import.

use scrivener_core::{Creator, CreatorName, Item};

const COLUMNS: &[(&str, &str)] = &[
    ("Item Type", "itemType"),
    ("Publication Year", "year"),
    ("Author", "author"),
    ("Title", "title"),
    ("Publication Title", "container"),
    ("ISBN", "ISBN"),
    ("ISSN", "ISSN"),
    ("DOI", "DOI"),
    ("Url", "url"),
    ("Abstract Note", "abstractNote"),
    ("Date", "date"),
    ("Pages", "pages"),
    ("Issue", "issue"),
    ("Volume", "volume"),
    ("Publisher", "publisher"),
    ("Place", "place"),
    ("Language", "language"),
    ("Extra", "extra"),
    ("Manual Tags", "tags"),
    ("Editor", "editor"),
];

fn csv_escape(s: &str) -> String {
    if s.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn flat_name(creator: &Creator) -> String {
    match &creator.name {
        CreatorName::Split {
            first_name,
            last_name,
        } if !first_name.is_empty() => format!("{}, {}", last_name, first_name),
        _ => creator.last_name().to_string(),
    }
}

fn creators(item: &Item, role: &str) -> String {
    item.creators
        .iter()
        .filter(|c| c.creator_type == role)
        .map(flat_name)
        .collect::<Vec<_>>()
        .join("; ")
}

fn cell(item: &Item, column: &str) -> String {
    match column {
        "itemType" => item.item_type.clone(),
        "year" => item.year().unwrap_or_default().to_string(),
        "author" | "editor" => creators(item, column),
        "container" => ["publicationTitle", "bookTitle", "proceedingsTitle", "websiteTitle"]
            .iter()
            .find_map(|k| item.get(k))
            .unwrap_or_default()
            .to_string(),
        "tags" => item
            .tags
            .iter()
            .map(|t| t.tag.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        field => item.get(field).unwrap_or_default().to_string(),
    }
}

/// Serialize items as CSV. Attachments and notes are dropped; creators are
/// flattened to `Last, First; …` in their original order.
pub fn export(items: &[Item]) -> String {
    let header: Vec<&str> = COLUMNS.iter().map(|(h, _)| *h).collect();
    let mut out = header.join(",");
    out.push('\n');
    for item in items {
        let row: Vec<String> = COLUMNS
            .iter()
            .map(|(_, column)| csv_escape(&cell(item, column)))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_cells_that_need_it() {
        let item = Item::new("book")
            .with_field("title", "Birds, \"Bees\"")
            .with_field("date", "1999")
            .with_creator(Creator::split("author", "Ada", "Lovelace"))
            .with_creator(Creator::single("author", "UNESCO"));
        let out = export(&[item]);
        let mut lines = out.lines();
        assert!(lines.next().unwrap().starts_with("Item Type,Publication Year,Author,Title"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("book,1999,\"Lovelace, Ada; UNESCO\",\"Birds, \"\"Bees\"\"\","));
    }
}
