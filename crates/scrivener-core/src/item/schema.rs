//! The item-type and creator-type vocabularies.
//!
//! These follow the Zotero item schema, which this crate consumes but does not
//! own. Bump [`SCHEMA_VERSION`] whenever the lists below are synced with a new
//! upstream schema release.

/// Upstream schema release the lists below were taken from.
pub const SCHEMA_VERSION: u32 = 29;

pub const ITEM_TYPES: &[&str] = &[
    "artwork",
    "attachment",
    "audioRecording",
    "bill",
    "blogPost",
    "book",
    "bookSection",
    "case",
    "computerProgram",
    "conferencePaper",
    "dataset",
    "dictionaryEntry",
    "document",
    "email",
    "encyclopediaArticle",
    "film",
    "forumPost",
    "hearing",
    "instantMessage",
    "interview",
    "journalArticle",
    "letter",
    "magazineArticle",
    "manuscript",
    "map",
    "newspaperArticle",
    "note",
    "patent",
    "podcast",
    "preprint",
    "presentation",
    "radioBroadcast",
    "report",
    "standard",
    "statute",
    "thesis",
    "tvBroadcast",
    "videoRecording",
    "webpage",
];

pub const CREATOR_TYPES: &[&str] = &[
    "artist",
    "attorneyAgent",
    "author",
    "bookAuthor",
    "cartographer",
    "castMember",
    "commenter",
    "composer",
    "contributor",
    "cosponsor",
    "counsel",
    "director",
    "editor",
    "guest",
    "host",
    "interviewee",
    "interviewer",
    "inventor",
    "performer",
    "podcaster",
    "presenter",
    "producer",
    "programmer",
    "recipient",
    "reviewedAuthor",
    "scriptwriter",
    "seriesEditor",
    "sponsor",
    "translator",
    "wordsBy",
];

pub fn is_item_type(name: &str) -> bool {
    ITEM_TYPES.contains(&name)
}

pub fn is_creator_type(name: &str) -> bool {
    CREATOR_TYPES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_sorted_and_unique() {
        for list in [ITEM_TYPES, CREATOR_TYPES] {
            let mut sorted = list.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted, list);
        }
    }

    #[test]
    fn known_and_unknown_types() {
        assert!(is_item_type("journalArticle"));
        assert!(is_item_type("preprint"));
        assert!(!is_item_type("JournalArticle"));
        assert!(is_creator_type("editor"));
        assert!(!is_creator_type("ghostwriter"));
    }
}
