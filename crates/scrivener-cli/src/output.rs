use std::io::Write;

use indexmap::IndexMap;
use owo_colors::OwoColorize;
use scrivener_core::{Item, LoadReport, TranslatorInfo};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn authors(item: &Item) -> String {
    let names: Vec<String> = item
        .creators
        .iter()
        .filter(|c| c.creator_type == "author")
        .map(|c| c.display_name())
        .collect();
    match names.len() {
        0 => String::new(),
        1..=3 => names.join(", "),
        _ => format!("{} et al.", names[0]),
    }
}

fn container(item: &Item) -> Option<&str> {
    ["publicationTitle", "proceedingsTitle", "bookTitle", "websiteTitle", "publisher"]
        .iter()
        .find_map(|k| item.get(k))
}

/// Print a short human-readable listing of translated items.
pub fn print_items(w: &mut dyn Write, items: &[Item], color: ColorMode) -> std::io::Result<()> {
    if items.is_empty() {
        writeln!(w, "No items found.")?;
        return Ok(());
    }
    for (i, item) in items.iter().enumerate() {
        let title = item.title().unwrap_or("(untitled)");
        if color.enabled() {
            let item_type = format!("({})", item.item_type);
            writeln!(w, "[{}] {} {}", i + 1, title.bold(), item_type.dimmed())?;
        } else {
            writeln!(w, "[{}] {} ({})", i + 1, title, item.item_type)?;
        }

        let mut byline = authors(item);
        if let Some(year) = item.year() {
            byline = if byline.is_empty() {
                year.to_string()
            } else {
                format!("{} ({})", byline, year)
            };
        }
        if !byline.is_empty() {
            writeln!(w, "    {}", byline)?;
        }
        if let Some(container) = container(item) {
            writeln!(w, "    {}", container)?;
        }
        if let Some(doi) = item.get("DOI") {
            if color.enabled() {
                writeln!(w, "    {} {}", "DOI:".dimmed(), doi.cyan())?;
            } else {
                writeln!(w, "    DOI: {}", doi)?;
            }
        }
    }
    Ok(())
}

/// Print the numbered candidates of a multi-result page.
pub fn print_selection(
    w: &mut dyn Write,
    url: &str,
    items: &IndexMap<String, String>,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{} {}", "Multiple items on".yellow(), url)?;
    } else {
        writeln!(w, "Multiple items on {}", url)?;
    }
    for (i, title) in items.values().enumerate() {
        writeln!(w, "  {:>3}. {}", i + 1, title)?;
    }
    Ok(())
}

pub fn print_translators(
    w: &mut dyn Write,
    translators: &[TranslatorInfo],
    color: ColorMode,
) -> std::io::Result<()> {
    for t in translators {
        let kind = t
            .engine
            .as_deref()
            .or(t.format.as_deref())
            .unwrap_or_default();
        if color.enabled() {
            writeln!(
                w,
                "{:<24} {:<7} {:>4}  {} {}",
                t.id.green(),
                t.target.as_str(),
                t.priority,
                t.label,
                format!("[{}]", kind).dimmed()
            )?;
        } else {
            writeln!(
                w,
                "{:<24} {:<7} {:>4}  {} [{}]",
                t.id,
                t.target.as_str(),
                t.priority,
                t.label,
                kind
            )?;
        }
    }
    Ok(())
}

/// Report translator definitions that were rejected while loading.
pub fn print_load_errors(
    w: &mut dyn Write,
    report: &LoadReport,
    color: ColorMode,
) -> std::io::Result<()> {
    for error in &report.errors {
        if color.enabled() {
            writeln!(w, "{} {}", "WARNING:".yellow(), error)?;
        } else {
            writeln!(w, "WARNING: {}", error)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrivener_core::Creator;

    fn render(items: &[Item]) -> String {
        let mut out = Vec::new();
        print_items(&mut out, items, ColorMode(false)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn items_render_with_byline() {
        let item = Item::new("journalArticle")
            .with_field("title", "Song Learning in Sparrows")
            .with_field("date", "1970-05")
            .with_field("publicationTitle", "Science")
            .with_field("DOI", "10.1000/x")
            .with_creator(Creator::split("author", "Peter", "Marler"));
        let out = render(&[item]);
        assert_eq!(
            out,
            "[1] Song Learning in Sparrows (journalArticle)\n    Peter Marler (1970)\n    Science\n    DOI: 10.1000/x\n"
        );
    }

    #[test]
    fn long_author_lists_are_abbreviated() {
        let mut item = Item::new("book").with_field("title", "Crowded");
        for name in ["A", "B", "C", "D"] {
            item = item.with_creator(Creator::split("author", "X", name));
        }
        assert!(render(&[item]).contains("X A et al."));
    }

    #[test]
    fn empty_results_say_so() {
        assert_eq!(render(&[]), "No items found.\n");
    }

    #[test]
    fn selection_is_numbered_from_one() {
        let mut items = IndexMap::new();
        items.insert("https://a.test/1".to_string(), "First".to_string());
        items.insert("https://a.test/2".to_string(), "Second".to_string());
        let mut out = Vec::new();
        print_selection(&mut out, "https://a.test/", &items, ColorMode(false)).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("    1. First\n"));
        assert!(out.contains("    2. Second\n"));
    }
}
