use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an entry on a change log topic. Strictly increasing per topic.
pub type EntryId = u64;

/// Row-level operation carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Map a capture operation code (`c`, `u`, `d`) to an operation.
    ///
    /// Any other code, including snapshot reads (`r`), yields `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Operation::Create),
            "u" => Some(Operation::Update),
            "d" => Some(Operation::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = crate::error::StreamdexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Operation::Create),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(crate::error::StreamdexError::MalformedEntry(format!(
                "unknown operation '{}'",
                other
            ))),
        }
    }
}

/// Which downstream projections are active for a consumption session.
///
/// A session captures one snapshot when it starts; toggling a flag produces
/// a new snapshot and restarts the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    pub fulltext: bool,
    pub suggest: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        FeatureFlags {
            fulltext: true,
            suggest: true,
        }
    }
}

impl FeatureFlags {
    pub fn with_fulltext(self, fulltext: bool) -> Self {
        FeatureFlags { fulltext, ..self }
    }

    pub fn with_suggest(self, suggest: bool) -> Self {
        FeatureFlags { suggest, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoopState {
    Running,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Running => f.write_str("RUNNING"),
            LoopState::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// Orders search results by a sortable field instead of relevance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub field: String,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
}

fn default_ascending() -> bool {
    true
}

impl SortBy {
    pub fn asc(field: impl Into<String>) -> Self {
        SortBy {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortBy {
            field: field.into(),
            ascending: false,
        }
    }
}

/// One search hit returned by the query surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    /// Relevance score; 0 when results are sorted by a field.
    pub score: f32,
    pub fields: indexmap::IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub took_ms: u128,
    pub hits: Vec<SearchHit>,
}

/// An autocomplete dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub payload: String,
    pub score: f64,
}

impl Suggestion {
    pub const DEFAULT_SCORE: f64 = 1.0;

    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Suggestion {
            label: label.into(),
            payload: payload.into(),
            score: Self::DEFAULT_SCORE,
        }
    }
}
