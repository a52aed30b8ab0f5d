use crate::error::{Result, StreamdexError};
use crate::types::EntryId;
use crate::utils::save_json_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// An entry delivered to a group and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: EntryId,
    /// Consumer the entry was last delivered to.
    pub consumer: String,
    pub delivery_count: u32,
    pub last_delivered_at: DateTime<Utc>,
}

/// Cursor and pending table of one consumer group on one topic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct GroupState {
    pub last_delivered: EntryId,
    #[serde(default)]
    pub pending: BTreeMap<EntryId, PendingEntry>,
}

impl GroupState {
    pub fn starting_after(last_delivered: EntryId) -> Self {
        GroupState {
            last_delivered,
            pending: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            StreamdexError::Transport(format!(
                "corrupt group state {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json_atomic(path, self)
    }

    /// Record a first delivery of `id` and advance the cursor past it.
    pub fn deliver_new(&mut self, id: EntryId, consumer: &str, now: DateTime<Utc>) {
        self.last_delivered = self.last_delivered.max(id);
        self.pending.insert(
            id,
            PendingEntry {
                id,
                consumer: consumer.to_string(),
                delivery_count: 1,
                last_delivered_at: now,
            },
        );
    }

    /// Record another delivery of a pending entry. Returns the new delivery
    /// count, or `None` when `id` is not pending.
    pub fn redeliver(&mut self, id: EntryId, consumer: &str, now: DateTime<Utc>) -> Option<u32> {
        let pending = self.pending.get_mut(&id)?;
        pending.delivery_count = pending.delivery_count.saturating_add(1);
        pending.consumer = consumer.to_string();
        pending.last_delivered_at = now;
        Some(pending.delivery_count)
    }

    pub fn acknowledge(&mut self, id: EntryId) -> bool {
        self.pending.remove(&id).is_some()
    }
}
