use serde::{Deserialize, Serialize};
use streamdex::{SortBy, SuggestOptions};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Sortable field to order hits by instead of relevance.
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub ascending: Option<bool>,
}

impl SearchParams {
    pub fn sort(&self) -> Option<SortBy> {
        self.sort_by.as_ref().map(|field| SortBy {
            field: field.clone(),
            ascending: self.ascending.unwrap_or(true),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub max: Option<usize>,
    #[serde(default)]
    pub fuzzy: Option<bool>,
}

impl SuggestParams {
    pub fn options(&self) -> SuggestOptions {
        let defaults = SuggestOptions::default();
        SuggestOptions {
            max: self.max.unwrap_or(defaults.max),
            fuzzy: self.fuzzy.unwrap_or(defaults.fuzzy),
        }
    }
}

/// Query of the feature toggle routes. Without `enabled` the flag flips.
#[derive(Debug, Default, Deserialize)]
pub struct ToggleParams {
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub entity: String,
    pub query: String,
    pub suggestions: Vec<streamdex::Suggestion>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub topic: String,
    pub group: String,
    pub id: u64,
    pub acknowledged: bool,
}

#[derive(Debug, Deserialize)]
pub struct TrimParams {
    pub before: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrimResponse {
    pub topic: String,
    pub before: u64,
    pub removed_segments: usize,
    pub last_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PendingResponse {
    pub topic: String,
    pub group: String,
    pub pending: Vec<streamdex::PendingEntry>,
}
