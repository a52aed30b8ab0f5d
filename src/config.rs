use crate::cdc::SourceFilter;
use crate::types::FeatureFlags;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "streamdex.json";

/// Runtime configuration for the indexer, the change log and the server.
///
/// Loaded from `{data_dir}/streamdex.json` when present, otherwise built from
/// `STREAMDEX_*` environment variables with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamdexConfig {
    pub data_dir: PathBuf,
    /// Change log topics to consume, e.g. `events:cdc:movies`.
    pub streams: Vec<String>,
    /// Topic prefix used when publishing normalized events.
    pub stream_prefix: String,
    /// Consumer groups are `{group_prefix}.index` and `{group_prefix}.suggest`.
    pub group_prefix: String,
    /// Consumer identity of this instance inside each group.
    pub consumer: String,
    pub batch_size: usize,
    pub read_block_ms: u64,
    pub backoff_short_ms: u64,
    pub backoff_long_ms: u64,
    /// Delivery count after which a pending entry is reported as poisoned.
    pub poison_threshold: u32,
    pub source: SourceFilter,
    pub fulltext: bool,
    pub suggest: bool,
    pub bind_addr: String,
}

impl Default for StreamdexConfig {
    fn default() -> Self {
        StreamdexConfig {
            data_dir: PathBuf::from("./data"),
            streams: vec![
                "events:cdc:movies".to_string(),
                "events:cdc:actors".to_string(),
            ],
            stream_prefix: "events:cdc".to_string(),
            group_prefix: "streamdex".to_string(),
            consumer: default_consumer(),
            batch_size: 1,
            read_block_ms: 0,
            backoff_short_ms: 100,
            backoff_long_ms: 500,
            poison_threshold: 10,
            source: SourceFilter::default(),
            fulltext: true,
            suggest: true,
            bind_addr: "127.0.0.1:7711".to_string(),
        }
    }
}

fn default_consumer() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "streamdex-1".to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| v != "false" && v != "0")
}

impl StreamdexConfig {
    /// Defaults rooted at `data_dir`, ignoring the environment.
    pub fn for_dir(data_dir: impl AsRef<Path>) -> Self {
        StreamdexConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `STREAMDEX_*` environment variables.
    pub fn from_env(data_dir: &Path) -> Self {
        let mut config = Self::for_dir(data_dir);

        if let Ok(streams) = std::env::var("STREAMDEX_STREAMS") {
            let streams: Vec<String> = streams
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !streams.is_empty() {
                config.streams = streams;
            }
        }
        if let Ok(prefix) = std::env::var("STREAMDEX_STREAM_PREFIX") {
            config.stream_prefix = prefix;
        }
        if let Ok(prefix) = std::env::var("STREAMDEX_GROUP_PREFIX") {
            config.group_prefix = prefix;
        }
        if let Ok(consumer) = std::env::var("STREAMDEX_CONSUMER") {
            config.consumer = consumer;
        }
        if let Ok(server) = std::env::var("STREAMDEX_SOURCE_SERVER") {
            config.source.server_name = server;
        }
        if let Ok(database) = std::env::var("STREAMDEX_SOURCE_DATABASE") {
            config.source.database_name = database;
        }
        if let Ok(bind) = std::env::var("STREAMDEX_BIND_ADDR") {
            config.bind_addr = bind;
        }
        config.batch_size = env_parse("STREAMDEX_BATCH_SIZE").unwrap_or(config.batch_size);
        config.read_block_ms = env_parse("STREAMDEX_READ_BLOCK_MS").unwrap_or(config.read_block_ms);
        config.poison_threshold =
            env_parse("STREAMDEX_POISON_THRESHOLD").unwrap_or(config.poison_threshold);
        config.fulltext = env_flag("STREAMDEX_FULLTEXT").unwrap_or(config.fulltext);
        config.suggest = env_flag("STREAMDEX_SUGGEST").unwrap_or(config.suggest);
        config
    }

    /// Load `{data_dir}/streamdex.json`, or fall back to [`Self::from_env`].
    pub fn load_or_default(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);

        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<StreamdexConfig>(&content) {
                    Ok(mut config) => {
                        config.data_dir = data_dir.to_path_buf();
                        tracing::info!(
                            "Loaded config: streams={:?}, group_prefix={}, consumer={}",
                            config.streams,
                            config.group_prefix,
                            config.consumer
                        );
                        return config;
                    }
                    Err(e) => {
                        tracing::error!("Failed to parse {}: {}, using defaults", CONFIG_FILE, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to read {}: {}, using defaults", CONFIG_FILE, e);
                }
            }
        }

        Self::from_env(data_dir)
    }

    pub fn flags(&self) -> FeatureFlags {
        FeatureFlags {
            fulltext: self.fulltext,
            suggest: self.suggest,
        }
    }

    pub fn search_group(&self) -> String {
        format!("{}.index", self.group_prefix)
    }

    pub fn suggest_group(&self) -> String {
        format!("{}.suggest", self.group_prefix)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("log")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("search")
    }

    pub fn suggest_dir(&self) -> PathBuf {
        self.data_dir.join("suggest")
    }

    pub fn read_block(&self) -> Duration {
        Duration::from_millis(self.read_block_ms)
    }

    /// Backoff after an empty read. Shorter when both groups share the loop.
    pub fn backoff(&self, flags: FeatureFlags) -> Duration {
        if flags.fulltext && flags.suggest {
            Duration::from_millis(self.backoff_short_ms)
        } else {
            Duration::from_millis(self.backoff_long_ms)
        }
    }
}
