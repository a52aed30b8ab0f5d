use crate::error::{Result, StreamdexError};
use crate::types::Suggestion;
use crate::utils::{path_component, save_json_atomic};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Options of a prefix lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestOptions {
    pub max: usize,
    /// Also match prefixes one edit away from the query.
    pub fuzzy: bool,
}

impl Default for SuggestOptions {
    fn default() -> Self {
        SuggestOptions {
            max: 5,
            fuzzy: false,
        }
    }
}

/// An autocomplete dictionary, partitioned by entity type.
///
/// Entries are keyed by their exact label. Adding an existing label replaces
/// its payload and score.
pub trait SuggestionStore: Send + Sync {
    fn add(&self, entity: &str, suggestion: Suggestion) -> Result<()>;

    /// Returns `false` when the label was not in the dictionary.
    fn delete(&self, entity: &str, label: &str) -> Result<bool>;

    fn get(&self, entity: &str, prefix: &str, options: SuggestOptions) -> Result<Vec<Suggestion>>;

    fn len(&self, entity: &str) -> Result<usize>;

    fn is_empty(&self, entity: &str) -> Result<bool> {
        Ok(self.len(entity)? == 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    payload: String,
    score: f64,
}

type Dictionary = BTreeMap<String, StoredEntry>;

/// [`SuggestionStore`] persisted as one JSON file per entity type.
pub struct FileSuggestionStore {
    dir: PathBuf,
    dictionaries: DashMap<String, Arc<RwLock<Dictionary>>>,
}

impl FileSuggestionStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(FileSuggestionStore {
            dir,
            dictionaries: DashMap::new(),
        })
    }

    fn path(&self, entity: &str) -> PathBuf {
        self.dir.join(format!("{}.json", path_component(entity)))
    }

    fn dictionary(&self, entity: &str) -> Result<Arc<RwLock<Dictionary>>> {
        if let Some(dict) = self.dictionaries.get(entity) {
            return Ok(Arc::clone(&dict));
        }

        let path = self.path(entity);
        let loaded: Dictionary = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            Dictionary::new()
        };
        tracing::debug!("[SUGG {}] loaded {} entries", entity, loaded.len());

        let dict = self
            .dictionaries
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(loaded)));
        Ok(Arc::clone(&dict))
    }

    fn mutate<T>(&self, entity: &str, f: impl FnOnce(&mut Dictionary) -> T) -> Result<T> {
        let dict = self.dictionary(entity)?;
        let mut guard = dict.write().map_err(|_| poisoned(entity))?;
        let out = f(&mut guard);
        save_json_atomic(&self.path(entity), &*guard)?;
        Ok(out)
    }
}

fn poisoned(entity: &str) -> StreamdexError {
    StreamdexError::Io(format!("suggestion dictionary {} lock poisoned", entity))
}

fn matches(label: &str, prefix: &str, fuzzy: bool) -> bool {
    let label_lower = label.to_lowercase();
    if label_lower.starts_with(prefix) {
        return true;
    }
    if !fuzzy || prefix.is_empty() {
        return false;
    }
    let head: String = label_lower.chars().take(prefix.chars().count()).collect();
    strsim::levenshtein(&head, prefix) <= 1
}

impl SuggestionStore for FileSuggestionStore {
    fn add(&self, entity: &str, suggestion: Suggestion) -> Result<()> {
        self.mutate(entity, |dict| {
            dict.insert(
                suggestion.label,
                StoredEntry {
                    payload: suggestion.payload,
                    score: suggestion.score,
                },
            );
        })
    }

    fn delete(&self, entity: &str, label: &str) -> Result<bool> {
        let dict = self.dictionary(entity)?;
        if !dict.read().map_err(|_| poisoned(entity))?.contains_key(label) {
            return Ok(false);
        }
        self.mutate(entity, |dict| dict.remove(label).is_some())
    }

    fn get(&self, entity: &str, prefix: &str, options: SuggestOptions) -> Result<Vec<Suggestion>> {
        let prefix = prefix.trim().to_lowercase();
        let dict = self.dictionary(entity)?;
        let guard = dict.read().map_err(|_| poisoned(entity))?;

        let mut found: Vec<Suggestion> = guard
            .iter()
            .filter(|(label, _)| matches(label, &prefix, options.fuzzy))
            .map(|(label, entry)| Suggestion {
                label: label.clone(),
                payload: entry.payload.clone(),
                score: entry.score,
            })
            .collect();

        found.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.label.cmp(&b.label))
        });
        found.truncate(options.max);
        Ok(found)
    }

    fn len(&self, entity: &str) -> Result<usize> {
        let dict = self.dictionary(entity)?;
        let len = dict.read().map_err(|_| poisoned(entity))?.len();
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(max: usize, fuzzy: bool) -> SuggestOptions {
        SuggestOptions { max, fuzzy }
    }

    #[test]
    fn test_add_is_an_upsert() {
        let tmp = TempDir::new().unwrap();
        let store = FileSuggestionStore::open(tmp.path()).unwrap();

        store.add("movies", Suggestion::new("Alien", "1")).unwrap();
        store.add("movies", Suggestion::new("Alien", "1")).unwrap();

        assert_eq!(store.len("movies").unwrap(), 1);
        let found = store.get("movies", "al", opts(5, false)).unwrap();
        assert_eq!(found, vec![Suggestion::new("Alien", "1")]);
    }

    #[test]
    fn test_delete_reports_presence() {
        let tmp = TempDir::new().unwrap();
        let store = FileSuggestionStore::open(tmp.path()).unwrap();
        store.add("movies", Suggestion::new("Heat", "2")).unwrap();

        assert!(store.delete("movies", "Heat").unwrap());
        assert!(!store.delete("movies", "Heat").unwrap());
        assert!(store.is_empty("movies").unwrap());
    }

    #[test]
    fn test_prefix_is_case_insensitive_and_ordered() {
        let tmp = TempDir::new().unwrap();
        let store = FileSuggestionStore::open(tmp.path()).unwrap();
        store.add("movies", Suggestion::new("Godzilla", "2")).unwrap();
        store.add("movies", Suggestion::new("The Godfather", "1")).unwrap();
        store.add("movies", Suggestion::new("Gone Girl", "3")).unwrap();
        let mut boosted = Suggestion::new("Goodfellas", "4");
        boosted.score = 2.0;
        store.add("movies", boosted).unwrap();

        let labels: Vec<String> = store
            .get("movies", "GO", opts(10, false))
            .unwrap()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["Goodfellas", "Godzilla", "Gone Girl"]);

        assert_eq!(store.get("movies", "go", opts(1, false)).unwrap().len(), 1);
    }

    #[test]
    fn test_fuzzy_prefix() {
        let tmp = TempDir::new().unwrap();
        let store = FileSuggestionStore::open(tmp.path()).unwrap();
        store.add("movies", Suggestion::new("Godzilla", "2")).unwrap();

        assert!(store.get("movies", "gad", opts(5, false)).unwrap().is_empty());
        assert_eq!(store.get("movies", "gad", opts(5, true)).unwrap().len(), 1);
        assert!(store.get("movies", "xaz", opts(5, true)).unwrap().is_empty());
    }

    #[test]
    fn test_entities_are_separate_and_persisted() {
        let tmp = TempDir::new().unwrap();
        {
            let store = FileSuggestionStore::open(tmp.path()).unwrap();
            store.add("movies", Suggestion::new("Alien", "1")).unwrap();
            store.add("actors", Suggestion::new("Ada Lovelace", "7")).unwrap();
        }

        let store = FileSuggestionStore::open(tmp.path()).unwrap();
        assert_eq!(store.len("movies").unwrap(), 1);
        assert_eq!(store.get("actors", "ada", opts(5, false)).unwrap()[0].payload, "7");
        assert!(store.get("movies", "ada", opts(5, false)).unwrap().is_empty());
    }
}
