use crate::cdc::FIELD_SOURCE_TABLE;
use crate::config::StreamdexConfig;
use crate::error::{Result, StreamdexError};
use crate::index::{ApplyOutcome, SearchIndexManager};
use crate::log::{ChangeLog, StreamEntry};
use crate::projector::{project, EntityRegistry};
use crate::suggest::{SuggestOutcome, SuggestionIndexManager};
use crate::types::FeatureFlags;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// The two independent consumers of the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Search,
    Suggest,
}

/// Result of handling one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Search(ApplyOutcome),
    Suggest(SuggestOutcome),
    /// No entity type is registered for the entry's table.
    Unregistered,
}

/// The index managers entries are dispatched to.
pub struct Downstream {
    pub registry: Arc<EntityRegistry>,
    pub search: Arc<SearchIndexManager>,
    pub suggest: Arc<SuggestionIndexManager>,
}

impl Downstream {
    /// Project `entry` and apply it for `kind`.
    pub fn dispatch(
        &self,
        kind: GroupKind,
        entry: &StreamEntry,
        flags: &FeatureFlags,
    ) -> Result<Dispatched> {
        let table = entry.field(FIELD_SOURCE_TABLE).ok_or_else(|| {
            StreamdexError::MalformedEntry(format!(
                "entry {} has no {}",
                entry.id, FIELD_SOURCE_TABLE
            ))
        })?;

        let Some(entity) = self.registry.get(table) else {
            return Ok(Dispatched::Unregistered);
        };
        let projection = project(entity, entry)?;

        match kind {
            GroupKind::Search => self
                .search
                .apply(&entity.name, &projection, flags)
                .map(Dispatched::Search),
            GroupKind::Suggest => self
                .suggest
                .handle(&entity.name, &projection, flags)
                .map(Dispatched::Suggest),
        }
    }
}

/// One run of the consumption loop, from start until stop or a fatal
/// change log error. Flags are fixed for the lifetime of a session.
pub(crate) struct Session {
    pub log: Arc<dyn ChangeLog>,
    pub downstream: Arc<Downstream>,
    pub config: Arc<StreamdexConfig>,
    pub flags: FeatureFlags,
    pub token: CancellationToken,
}

impl Session {
    /// Drive the loop until the token is cancelled or a pass fails on the
    /// change log. Passes run on the blocking pool; backoffs end as soon as
    /// the token is cancelled.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let backoff = self.config.backoff(self.flags);
        tracing::info!(
            "[STREAM] session started: fulltext={} suggest={} topics={:?}",
            self.flags.fulltext,
            self.flags.suggest,
            self.config.streams
        );

        while !self.token.is_cancelled() {
            if self.flags.fulltext && Arc::clone(&self).pass(GroupKind::Search).await? == 0 {
                self.pause(backoff).await;
            }

            if self.token.is_cancelled() {
                break;
            }

            if self.flags.suggest && Arc::clone(&self).pass(GroupKind::Suggest).await? == 0 {
                self.pause(backoff).await;
            }

            if !self.flags.fulltext && !self.flags.suggest {
                self.pause(backoff).await;
            }
        }

        tracing::info!("[STREAM] session cancelled");
        Ok(())
    }

    async fn pass(self: Arc<Self>, kind: GroupKind) -> Result<usize> {
        tokio::task::spawn_blocking(move || self.consume(kind))
            .await
            .map_err(|e| StreamdexError::Transport(format!("consumer pass aborted: {}", e)))?
    }

    fn group(&self, kind: GroupKind) -> String {
        match kind {
            GroupKind::Search => self.config.search_group(),
            GroupKind::Suggest => self.config.suggest_group(),
        }
    }

    /// Read one batch per topic for the group behind `kind`. Returns the
    /// number of entries processed successfully, so a pass that only
    /// redelivers failing entries backs off like an empty one.
    fn consume(&self, kind: GroupKind) -> Result<usize> {
        let group = self.group(kind);
        let mut processed = 0;

        for topic in &self.config.streams {
            let entries = match self.log.read_group(
                topic,
                &group,
                &self.config.consumer,
                self.config.batch_size,
                self.config.read_block(),
            ) {
                Ok(entries) => entries,
                Err(e) if e.is_transport() => {
                    tracing::error!("[STREAM {}] read from {} failed: {}", group, topic, e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("[STREAM {}] read from {} failed: {}", group, topic, e);
                    continue;
                }
            };

            for entry in &entries {
                if self.handle(kind, topic, &group, entry) {
                    processed += 1;
                }
            }
        }

        Ok(processed)
    }

    /// Dispatch one entry and acknowledge it on success.
    fn handle(&self, kind: GroupKind, topic: &str, group: &str, entry: &StreamEntry) -> bool {
        let started = Instant::now();
        match self.downstream.dispatch(kind, entry, &self.flags) {
            Ok(outcome) => {
                if outcome == Dispatched::Unregistered {
                    tracing::debug!(
                        "[STREAM {}] skipping {}:{} with unregistered table {:?}",
                        group,
                        topic,
                        entry.id,
                        entry.field(FIELD_SOURCE_TABLE)
                    );
                }
                match self.log.acknowledge(topic, group, entry.id) {
                    Ok(_) => tracing::debug!(
                        "[STREAM {}] {}:{} {:?} in {}ms",
                        group,
                        topic,
                        entry.id,
                        outcome,
                        started.elapsed().as_millis()
                    ),
                    Err(e) => tracing::error!(
                        "[STREAM {}] ack of {}:{} failed, entry stays pending: {}",
                        group,
                        topic,
                        entry.id,
                        e
                    ),
                }
                true
            }
            Err(e) => {
                tracing::warn!(
                    "[STREAM {}] entry {}:{} failed, will be redelivered: {}",
                    group,
                    topic,
                    entry.id,
                    e
                );
                self.report_poison(topic, group, entry.id);
                false
            }
        }
    }

    fn report_poison(&self, topic: &str, group: &str, id: u64) {
        let Ok(pending) = self.log.pending(topic, group) else {
            return;
        };
        if let Some(p) = pending.iter().find(|p| p.id == id) {
            if p.delivery_count > self.config.poison_threshold {
                tracing::error!(
                    "[STREAM {}] poison entry {}:{} delivered {} times; acknowledge it to move on",
                    group,
                    topic,
                    id,
                    p.delivery_count
                );
            }
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
