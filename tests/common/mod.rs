use indexmap::IndexMap;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use streamdex::{
    ChangeLog, EntryId, GroupCreated, PendingEntry, Pipeline, RawRecord, Result, StartPosition,
    StreamEntry, StreamIndexer, StreamdexConfig, StreamdexError,
};

/// Config rooted at `dir` with short backoffs so loop tests stay fast.
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> StreamdexConfig {
    let mut config = StreamdexConfig::for_dir(dir);
    config.consumer = "test-consumer".to_string();
    config.backoff_short_ms = 5;
    config.backoff_long_ms = 10;
    config.poison_threshold = 3;
    config
}

#[allow(dead_code)]
pub fn record(table: &str, op: &str, key: Value, before: Value, after: Value) -> RawRecord {
    RawRecord {
        topic: Some(format!("dbserver1.inventory.{}", table)),
        key: Some(key),
        value: Some(json!({
            "before": before,
            "after": after,
            "source": {"db": "inventory", "table": table},
            "op": op,
        })),
    }
}

#[allow(dead_code)]
pub fn movie(id: u64, title: &str) -> Value {
    json!({
        "movie_id": id,
        "title": title,
        "genre": "Drama",
        "votes": 100,
        "rating": 7.5,
        "release_year": 1999,
        "plot": null,
    })
}

#[allow(dead_code)]
pub fn movie_create(id: u64, title: &str) -> RawRecord {
    record("movies", "c", json!({"movie_id": id}), Value::Null, movie(id, title))
}

#[allow(dead_code)]
pub fn movie_update(id: u64, old_title: &str, new_title: &str) -> RawRecord {
    record(
        "movies",
        "u",
        json!({"movie_id": id}),
        movie(id, old_title),
        movie(id, new_title),
    )
}

#[allow(dead_code)]
pub fn movie_delete(id: u64, title: &str) -> RawRecord {
    record("movies", "d", json!({"movie_id": id}), movie(id, title), Value::Null)
}

/// Poll `check` until it holds or `timeout` passes.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

/// A [`ChangeLog`] that forwards to another one and records every
/// acknowledgement and read.
#[allow(dead_code)]
pub struct RecordingLog {
    inner: Arc<dyn ChangeLog>,
    pub acks: Mutex<Vec<(String, String, EntryId)>>,
    pub reads: Mutex<Vec<(String, String)>>,
    /// When set, every read fails with a transport error.
    pub fail_reads: AtomicBool,
}

#[allow(dead_code)]
impl RecordingLog {
    pub fn new(inner: Arc<dyn ChangeLog>) -> Arc<Self> {
        Arc::new(RecordingLog {
            inner,
            acks: Mutex::new(Vec::new()),
            reads: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
        })
    }

    pub fn acked(&self, topic: &str, group: &str, id: EntryId) -> bool {
        self.acks
            .lock()
            .unwrap()
            .iter()
            .any(|(t, g, i)| t == topic && g == group && *i == id)
    }

    /// How many times `id` was acknowledged for `group`.
    pub fn ack_count(&self, topic: &str, group: &str, id: EntryId) -> usize {
        self.acks
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, g, i)| t == topic && g == group && *i == id)
            .count()
    }

    pub fn read_count(&self, group: &str) -> usize {
        self.reads
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, g)| g == group)
            .count()
    }
}

impl ChangeLog for RecordingLog {
    fn append(&self, topic: &str, fields: IndexMap<String, String>) -> Result<EntryId> {
        self.inner.append(topic, fields)
    }

    fn ensure_group(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
        create_topic: bool,
    ) -> Result<GroupCreated> {
        self.inner.ensure_group(topic, group, start, create_topic)
    }

    fn read_group(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StreamdexError::Transport("connection reset".to_string()));
        }
        self.reads
            .lock()
            .unwrap()
            .push((topic.to_string(), group.to_string()));
        self.inner.read_group(topic, group, consumer, count, block)
    }

    fn acknowledge(&self, topic: &str, group: &str, id: EntryId) -> Result<bool> {
        let acked = self.inner.acknowledge(topic, group, id)?;
        self.acks
            .lock()
            .unwrap()
            .push((topic.to_string(), group.to_string(), id));
        Ok(acked)
    }

    fn pending(&self, topic: &str, group: &str) -> Result<Vec<PendingEntry>> {
        self.inner.pending(topic, group)
    }

    fn entry_count(&self, topic: &str) -> Result<usize> {
        self.inner.entry_count(topic)
    }
}

/// A stopped pipeline plus an indexer that consumes through a
/// [`RecordingLog`] wrapped around the pipeline's change log.
#[allow(dead_code)]
pub fn recorded_indexer(config: StreamdexConfig) -> (Arc<Pipeline>, Arc<RecordingLog>, StreamIndexer) {
    let pipeline = Pipeline::open(config.clone()).unwrap();
    let shared: Arc<dyn ChangeLog> = pipeline.log().clone();
    let recording = RecordingLog::new(shared);
    let log: Arc<dyn ChangeLog> = recording.clone();
    let indexer = StreamIndexer::new(
        config,
        log,
        Arc::clone(pipeline.search()),
        Arc::clone(pipeline.suggest()),
    );
    (pipeline, recording, indexer)
}

/// Route `tracing` output through the test harness, filtered by `RUST_LOG`.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
