//! Ordered change log with independent consumer groups.
//!
//! [`ChangeLog`] is the interface the rest of the crate consumes;
//! [`FileChangeLog`] is the durable implementation backed by segmented JSONL
//! files on disk.

mod file;
mod group;

pub use file::FileChangeLog;
pub use group::PendingEntry;

use crate::error::Result;
use crate::types::EntryId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An immutable, flattened entry on a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: EntryId,
    pub timestamp_ms: u64,
    pub fields: IndexMap<String, String>,
}

impl StreamEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Where a newly created consumer group starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// Deliver every entry on the topic.
    Beginning,
    /// Deliver only entries appended after the group is created.
    Latest,
    /// Deliver entries with an id greater than the given one.
    After(EntryId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupCreated {
    Created,
    AlreadyExists,
}

pub trait ChangeLog: Send + Sync {
    /// Append an entry to `topic`, creating the topic if needed.
    fn append(&self, topic: &str, fields: IndexMap<String, String>) -> Result<EntryId>;

    /// Create `group` on `topic` unless it already exists.
    ///
    /// An existing group is not an error. When the topic does not exist it
    /// is created if `create_topic` is set, otherwise
    /// [`crate::StreamdexError::TopicNotFound`] is returned.
    fn ensure_group(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
        create_topic: bool,
    ) -> Result<GroupCreated>;

    /// Deliver up to `count` entries to `consumer` on behalf of `group`.
    ///
    /// Entries delivered earlier but not yet acknowledged come first, oldest
    /// first, followed by entries never delivered to the group, in append
    /// order. Waits up to `block` when there is nothing to deliver; a zero
    /// `block` returns immediately.
    fn read_group(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>>;

    /// Mark an entry as processed by `group`. Returns `false` when the entry
    /// was not pending for the group.
    fn acknowledge(&self, topic: &str, group: &str, id: EntryId) -> Result<bool>;

    /// Entries delivered to `group` and not yet acknowledged.
    fn pending(&self, topic: &str, group: &str) -> Result<Vec<PendingEntry>>;

    /// Number of entries currently retained on `topic`.
    fn entry_count(&self, topic: &str) -> Result<usize>;
}
