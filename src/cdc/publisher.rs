use super::event::ChangeEvent;
use super::normalizer::{Normalizer, RawRecord, SourceFilter};
use crate::error::Result;
use crate::log::ChangeLog;
use crate::types::EntryId;
use std::sync::Arc;

/// Normalizes capture records and appends them to `<stream_prefix>:<table>`.
pub struct ChangeEventPublisher {
    normalizer: Normalizer,
    log: Arc<dyn ChangeLog>,
    stream_prefix: String,
}

impl ChangeEventPublisher {
    pub fn new(filter: &SourceFilter, log: Arc<dyn ChangeLog>, stream_prefix: &str) -> Self {
        ChangeEventPublisher {
            normalizer: Normalizer::new(filter),
            log,
            stream_prefix: stream_prefix.to_string(),
        }
    }

    pub fn topic_for(&self, table: &str) -> String {
        format!("{}:{}", self.stream_prefix, table)
    }

    /// Returns the id of the appended entry, or `None` when the record was
    /// filtered out by the normalizer.
    pub fn publish(&self, record: &RawRecord) -> Result<Option<EntryId>> {
        match self.normalizer.normalize(record) {
            Some(event) => self.publish_event(&event).map(Some),
            None => Ok(None),
        }
    }

    pub fn publish_event(&self, event: &ChangeEvent) -> Result<EntryId> {
        let topic = self.topic_for(event.table());
        let id = self.log.append(&topic, event.to_stream_fields())?;
        tracing::debug!(
            "[CDC] published {} {} as {}:{}",
            event.operation(),
            event.table(),
            topic,
            id
        );
        Ok(id)
    }
}
