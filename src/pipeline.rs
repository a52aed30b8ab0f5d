use crate::cdc::ChangeEventPublisher;
use crate::config::StreamdexConfig;
use crate::error::Result;
use crate::index::SearchIndexManager;
use crate::log::{ChangeLog, FileChangeLog};
use crate::projector::EntityRegistry;
use crate::stream::StreamIndexer;
use crate::suggest::{FileSuggestionStore, SuggestionIndexManager};
use std::sync::Arc;

/// Every component wired together over one data directory.
///
/// ```text
/// {data_dir}/log/      change log topics and consumer groups
/// {data_dir}/search/   one tantivy index per entity type
/// {data_dir}/suggest/  one suggestion dictionary per entity type
/// ```
pub struct Pipeline {
    config: StreamdexConfig,
    log: Arc<FileChangeLog>,
    search: Arc<SearchIndexManager>,
    suggest: Arc<SuggestionIndexManager>,
    publisher: ChangeEventPublisher,
    indexer: StreamIndexer,
}

impl Pipeline {
    pub fn open(config: StreamdexConfig) -> Result<Arc<Self>> {
        Self::open_with_registry(config, EntityRegistry::with_builtins())
    }

    pub fn open_with_registry(
        config: StreamdexConfig,
        registry: EntityRegistry,
    ) -> Result<Arc<Self>> {
        let log = Arc::new(FileChangeLog::open(config.log_dir())?);
        let search = SearchIndexManager::open(config.index_dir(), Arc::new(registry))?;
        search.bootstrap()?;
        let store = Arc::new(FileSuggestionStore::open(config.suggest_dir())?);
        let suggest = Arc::new(SuggestionIndexManager::new(store));

        let shared_log: Arc<dyn ChangeLog> = log.clone();
        let publisher =
            ChangeEventPublisher::new(&config.source, shared_log.clone(), &config.stream_prefix);
        let indexer = StreamIndexer::new(
            config.clone(),
            shared_log,
            Arc::clone(&search),
            Arc::clone(&suggest),
        );

        tracing::info!(
            "[PIPELINE] opened {} (topics {:?})",
            config.data_dir.display(),
            config.streams
        );

        Ok(Arc::new(Pipeline {
            config,
            log,
            search,
            suggest,
            publisher,
            indexer,
        }))
    }

    pub fn config(&self) -> &StreamdexConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<FileChangeLog> {
        &self.log
    }

    pub fn search(&self) -> &Arc<SearchIndexManager> {
        &self.search
    }

    pub fn suggest(&self) -> &Arc<SuggestionIndexManager> {
        &self.suggest
    }

    pub fn publisher(&self) -> &ChangeEventPublisher {
        &self.publisher
    }

    pub fn indexer(&self) -> &StreamIndexer {
        &self.indexer
    }
}
