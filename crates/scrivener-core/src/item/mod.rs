//! The Item model: one bibliographic record.
//!
//! Items serialize to the Zotero API item shape (`itemType`, `creators`,
//! `tags`, `notes`, `attachments`, plus flat string fields), which is also
//! the native `json` export format.

pub mod schema;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::identifiers::clean_doi;
use crate::text::{collapse_whitespace, tidy_title};

/// A structured bibliographic record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "itemType")]
    pub item_type: String,
    /// Ordered; the order is semantically significant for citation rendering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub creators: Vec<Creator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    #[serde(rename = "creatorType")]
    pub creator_type: String,
    #[serde(flatten)]
    pub name: CreatorName,
}

/// Two-field (`firstName`/`lastName`) or single-field (`name`) creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CreatorName {
    Split {
        #[serde(rename = "firstName", default)]
        first_name: String,
        #[serde(rename = "lastName")]
        last_name: String,
    },
    Single {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Creator {
    pub fn split(creator_type: &str, first_name: &str, last_name: &str) -> Self {
        Self {
            creator_type: creator_type.to_string(),
            name: CreatorName::Split {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            },
        }
    }

    pub fn single(creator_type: &str, name: &str) -> Self {
        Self {
            creator_type: creator_type.to_string(),
            name: CreatorName::Single {
                name: name.to_string(),
            },
        }
    }

    /// Parse a free-form personal name.
    ///
    /// `"Family, Given"` splits on the comma; otherwise the last whitespace
    /// separated token is the family name. A lone token becomes a
    /// single-field creator.
    pub fn parse(creator_type: &str, raw: &str) -> Self {
        let raw = collapse_whitespace(raw);
        if let Some((last, first)) = raw.split_once(',') {
            let last = last.trim();
            if !last.is_empty() {
                return Self::split(creator_type, first.trim(), last);
            }
        }
        match raw.rsplit_once(' ') {
            Some((first, last)) => Self::split(creator_type, first.trim(), last.trim()),
            None => Self::single(creator_type, &raw),
        }
    }

    /// Family name, or the full name for single-field creators.
    pub fn last_name(&self) -> &str {
        match &self.name {
            CreatorName::Split { last_name, .. } => last_name,
            CreatorName::Single { name } => name,
        }
    }

    pub fn first_name(&self) -> &str {
        match &self.name {
            CreatorName::Split { first_name, .. } => first_name,
            CreatorName::Single { .. } => "",
        }
    }

    /// "Given Family" display form.
    pub fn display_name(&self) -> String {
        match &self.name {
            CreatorName::Split {
                first_name,
                last_name,
            } => format!("{} {}", first_name, last_name).trim().to_string(),
            CreatorName::Single { name } => name.clone(),
        }
    }
}

impl Tag {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
        }
    }
}

impl Item {
    pub fn new(item_type: &str) -> Self {
        Self {
            item_type: item_type.to_string(),
            creators: Vec::new(),
            tags: Vec::new(),
            notes: Vec::new(),
            attachments: Vec::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn with_creator(mut self, creator: Creator) -> Self {
        self.creators.push(creator);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Set a field; empty values are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if !value.is_empty() {
            self.fields.insert(key.to_string(), value.to_string());
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    /// Four-digit year parsed out of the `date` field.
    pub fn year(&self) -> Option<&str> {
        let date = self.get("date")?;
        date.as_bytes()
            .windows(4)
            .position(|w| w.iter().all(u8::is_ascii_digit))
            .map(|i| &date[i..i + 4])
    }

    /// Whether `itemType` is part of the item schema.
    pub fn has_known_type(&self) -> bool {
        schema::is_item_type(&self.item_type)
    }

    /// Clean up field values in place. Creator order is never changed.
    pub fn normalize(&mut self) {
        let mut cleaned = BTreeMap::new();
        for (key, value) in std::mem::take(&mut self.fields) {
            let value = match key.as_str() {
                "title" | "shortTitle" | "publicationTitle" | "bookTitle" => tidy_title(&value),
                "DOI" => clean_doi(&value),
                "abstractNote" => value.trim().to_string(),
                _ => collapse_whitespace(&value),
            };
            if !value.is_empty() {
                cleaned.insert(key, value);
            }
        }
        self.fields = cleaned;

        for creator in &mut self.creators {
            if !schema::is_creator_type(&creator.creator_type) {
                tracing::debug!(
                    creator_type = %creator.creator_type,
                    "unknown creator type, coercing to author"
                );
                creator.creator_type = "author".to_string();
            }
            match &mut creator.name {
                CreatorName::Split {
                    first_name,
                    last_name,
                } => {
                    *first_name = collapse_whitespace(first_name);
                    *last_name = collapse_whitespace(last_name);
                }
                CreatorName::Single { name } => *name = collapse_whitespace(name),
            }
        }
        self.creators.retain(|c| !c.last_name().is_empty());

        let mut seen = HashSet::new();
        self.tags.retain_mut(|t| {
            t.tag = collapse_whitespace(&t.tag);
            !t.tag.is_empty() && seen.insert(t.tag.to_lowercase())
        });
        self.notes.retain(|n| !n.trim().is_empty());
    }
}
