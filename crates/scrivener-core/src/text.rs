//! Text cleanup helpers shared by engines, normalization and matching.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// Attributes must carry a value, so `a<b and c>d` is left alone.
static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"</?[A-Za-z][A-Za-z0-9:-]*(?:\s+[A-Za-z_:][-A-Za-z0-9_:.]*\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))*\s*/?>"#,
    )
    .unwrap()
});
static MATHML_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<mml:[^>]+>.*?</mml:[^>]+>").unwrap());
static TEX_MATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$[^$]*\$|\\\(.*?\\\)").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WS_RE.replace_all(text.trim(), " ").into_owned()
}

/// Decode the handful of HTML entities that show up in scraped metadata.
pub fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Remove HTML/XML tags and MathML blocks.
pub fn strip_markup(text: &str) -> String {
    let text = MATHML_BLOCK_RE.replace_all(text, "");
    let text = TAG_RE.replace_all(&text, "");
    unescape_entities(&text)
}

/// Light cleanup for titles that leave the system: markup removed,
/// whitespace collapsed, a single trailing period dropped.
pub fn tidy_title(title: &str) -> String {
    let title = collapse_whitespace(&strip_markup(title));
    match title.strip_suffix('.') {
        Some(t) if !t.ends_with('.') => t.trim_end().to_string(),
        _ => title,
    }
}

/// Aggressive cleanup used for comparing titles: markup and inline TeX math
/// removed, dashes unified, hyphen spacing tightened, punctuation that ends a
/// word dropped.
pub fn clean_title(title: &str) -> String {
    static DASH_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[\u{2010}\u{2011}\u{2012}\u{2013}\u{2014}\u{2212}]").unwrap());
    static HYPHEN_SPACING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*-\s*").unwrap());
    static TRAILING_PUNCT_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"[.,;:!?]+(\s|$)").unwrap());

    let title = strip_markup(title);
    let title = TEX_MATH_RE.replace_all(&title, "");
    let title = DASH_RE.replace_all(&title, "-");
    let title = HYPHEN_SPACING_RE.replace_all(&title, "-");
    let title = TRAILING_PUNCT_RE.replace_all(&title, "$1");
    collapse_whitespace(&title)
}

/// Lowercased, accent-folded, punctuation-free name in
/// `"family initials"` form, for comparing creator lists.
pub fn normalize_author_name(name: &str) -> String {
    let folded: String = name.trim().to_lowercase().nfkd().filter(char::is_ascii).collect();
    let cleaned: String = folded
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    match parts.split_last() {
        Some((last, rest)) if !rest.is_empty() => {
            let initials: Vec<String> = rest
                .iter()
                .filter_map(|p| p.chars().next())
                .map(String::from)
                .collect();
            format!("{} {}", last, initials.join(" "))
        }
        _ => parts.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_markup_removes_tags_and_mathml() {
        assert_eq!(
            strip_markup("A <i>new</i> bound <mml:math><mml:mi>x</mml:mi></mml:math>&amp; more"),
            "A new bound & more"
        );
    }

    #[test]
    fn bare_angle_brackets_are_not_markup() {
        assert_eq!(tidy_title("Why a<b and c>d matter"), "Why a<b and c>d matter");
        assert_eq!(tidy_title("When x < y > z"), "When x < y > z");
        assert_eq!(
            strip_markup(r#"H<sub>2</sub>O in <span class="sc">Mars</span> ice<br/>"#),
            "H2O in Mars ice"
        );
    }

    #[test]
    fn tidy_title_keeps_inner_punctuation() {
        assert_eq!(
            tidy_title("Dr. Strangelove: or How I Learned."),
            "Dr. Strangelove: or How I Learned"
        );
        assert_eq!(tidy_title("Et cetera..."), "Et cetera...");
    }

    #[test]
    fn clean_title_unifies_for_comparison() {
        assert_eq!(
            clean_title("Self \u{2013} supervised learning: a survey."),
            "Self-supervised learning a survey"
        );
        assert_eq!(clean_title("Bounds on $O(n)$ sorting"), "Bounds on sorting");
    }

    #[test]
    fn author_names_fold_to_family_and_initials() {
        assert_eq!(normalize_author_name("José  María García"), "garcia j m");
        assert_eq!(normalize_author_name("Plato"), "plato");
        assert_eq!(normalize_author_name(""), "");
    }
}
