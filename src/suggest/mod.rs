//! Autocomplete dictionary maintenance.
//!
//! The dictionary has no update operation. A changed label is applied as an
//! insert of the new label followed by a delete of the old one, so a lookup
//! never sees the entity without any label.

mod store;

pub use store::{FileSuggestionStore, SuggestOptions, SuggestionStore};

use crate::error::Result;
use crate::projector::Projection;
use crate::types::{FeatureFlags, Operation, Suggestion};
use std::sync::Arc;

/// What [`SuggestionIndexManager::update_suggestion`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestOutcome {
    /// Suggestions are disabled for the session; the store was not touched.
    Disabled,
    Inserted,
    /// Old and new label are identical, or both absent.
    Unchanged,
    Replaced,
    Deleted,
}

pub struct SuggestionIndexManager {
    store: Arc<dyn SuggestionStore>,
}

impl SuggestionIndexManager {
    pub fn new(store: Arc<dyn SuggestionStore>) -> Self {
        SuggestionIndexManager { store }
    }

    pub fn store(&self) -> &Arc<dyn SuggestionStore> {
        &self.store
    }

    /// Move the entity `payload` from `old_label` to `new_label`.
    ///
    /// Labels compare exactly, case included. Inserts are upserts with the
    /// default score, so applying the same change twice leaves the
    /// dictionary as applying it once.
    pub fn update_suggestion(
        &self,
        entity: &str,
        new_label: Option<&str>,
        old_label: Option<&str>,
        payload: &str,
        flags: &FeatureFlags,
    ) -> Result<SuggestOutcome> {
        if !flags.suggest {
            return Ok(SuggestOutcome::Disabled);
        }

        match (new_label, old_label) {
            (Some(new), None) => {
                self.store.add(entity, Suggestion::new(new, payload))?;
                tracing::debug!("[SUGG {}] inserted '{}' -> {}", entity, new, payload);
                Ok(SuggestOutcome::Inserted)
            }
            (Some(new), Some(old)) if new == old => {
                tracing::info!(
                    "[SUGG {}] label '{}' unchanged for {}, skipping",
                    entity,
                    new,
                    payload
                );
                Ok(SuggestOutcome::Unchanged)
            }
            (Some(new), Some(old)) => {
                self.store.add(entity, Suggestion::new(new, payload))?;
                let removed = self.store.delete(entity, old)?;
                tracing::debug!(
                    "[SUGG {}] replaced '{}' with '{}' for {} (old present: {})",
                    entity,
                    old,
                    new,
                    payload,
                    removed
                );
                Ok(SuggestOutcome::Replaced)
            }
            (None, Some(old)) => {
                let removed = self.store.delete(entity, old)?;
                tracing::debug!(
                    "[SUGG {}] deleted '{}' for {} (present: {})",
                    entity,
                    old,
                    payload,
                    removed
                );
                Ok(SuggestOutcome::Deleted)
            }
            (None, None) => Ok(SuggestOutcome::Unchanged),
        }
    }

    /// Apply a projected change: CREATE adds its label, UPDATE moves from
    /// the pre-image label, DELETE removes the pre-image label.
    pub fn handle(
        &self,
        entity: &str,
        projection: &Projection,
        flags: &FeatureFlags,
    ) -> Result<SuggestOutcome> {
        let label = projection.label.as_deref();
        let (new_label, old_label) = match projection.operation {
            Operation::Create => (label, None),
            Operation::Update => (label, projection.before_label.as_deref()),
            Operation::Delete => (None, label),
        };

        let result =
            self.update_suggestion(entity, new_label, old_label, &projection.key, flags);
        if let Err(e) = &result {
            tracing::error!(
                "[SUGG {}] failed to apply {} {}: {}",
                entity,
                projection.operation,
                projection.doc_id,
                e
            );
        }
        result
    }

    pub fn suggest(
        &self,
        entity: &str,
        prefix: &str,
        options: SuggestOptions,
    ) -> Result<Vec<Suggestion>> {
        self.store.get(entity, prefix, options)
    }
}
