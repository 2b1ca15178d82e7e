use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// Follow-up to a `300` response: the chosen subset of `items`.
#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub token: String,
    /// Keys are candidate ids; values are ignored.
    pub items: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct SelectionEntry {
    pub title: String,
}

/// Body of a `300 Multiple Choices` response.
#[derive(Debug, Serialize)]
pub struct SelectionResponse {
    pub url: String,
    pub token: String,
    pub items: IndexMap<String, SelectionEntry>,
}

impl SelectionResponse {
    pub fn new(url: String, token: String, items: IndexMap<String, String>) -> Self {
        Self {
            url,
            token,
            items: items
                .into_iter()
                .map(|(id, title)| (id, SelectionEntry { title }))
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportParams {
    pub format: Option<String>,
    #[serde(default)]
    pub dedupe: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TranslatorsParams {
    pub target: Option<String>,
}
