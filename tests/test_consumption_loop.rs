mod common;

use common::*;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use streamdex::{ChangeLog, LoopState, SuggestOptions};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(10);
const MOVIES: &str = "events:cdc:movies";
const SEARCH_GROUP: &str = "streamdex.index";
const SUGGEST_GROUP: &str = "streamdex.suggest";

fn bad_votes_movie(id: u64, title: &str) -> streamdex::RawRecord {
    let mut after = movie(id, title);
    after["votes"] = json!("many");
    record("movies", "c", json!({"movie_id": id}), Value::Null, after)
}

#[test]
fn test_start_and_stop_transitions() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (_pipeline, _recording, indexer) = recorded_indexer(test_config(tmp.path()));

    assert_eq!(indexer.state(), LoopState::Stopped);
    assert_eq!(indexer.start().unwrap(), LoopState::Running);
    // starting twice keeps the single session
    assert_eq!(indexer.start().unwrap(), LoopState::Running);
    assert_eq!(indexer.state(), LoopState::Running);

    assert_eq!(indexer.stop(), LoopState::Stopped);
    assert_eq!(indexer.stop(), LoopState::Stopped);
    assert_eq!(indexer.state(), LoopState::Stopped);

    let status = indexer.status();
    assert!(status.fulltext);
    assert!(status.suggest);
    assert_eq!(status.last_error, None);
}

#[test]
fn test_start_creates_groups_on_every_topic() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (pipeline, _recording, indexer) = recorded_indexer(test_config(tmp.path()));

    indexer.start().unwrap();
    indexer.stop();

    for topic in ["events:cdc:movies", "events:cdc:actors"] {
        for group in [SEARCH_GROUP, SUGGEST_GROUP] {
            assert!(pipeline.log().pending(topic, group).unwrap().is_empty());
        }
    }
}

#[test]
fn test_failing_entry_is_never_acknowledged() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (pipeline, recording, indexer) = recorded_indexer(test_config(tmp.path()));

    let id = pipeline
        .publisher()
        .publish(&bad_votes_movie(1, "Counted"))
        .unwrap()
        .unwrap();

    indexer.start().unwrap();
    assert!(wait_until(WAIT, || recording.read_count(SEARCH_GROUP) >= 5));
    indexer.stop();

    assert!(!recording.acked(MOVIES, SEARCH_GROUP, id));
    let pending = pipeline.log().pending(MOVIES, SEARCH_GROUP).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert!(pending[0].delivery_count >= 2);
    assert!(pipeline.search().get("movies", "1").unwrap().is_none());
}

#[test]
fn test_search_failure_does_not_block_suggest_group() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (pipeline, recording, indexer) = recorded_indexer(test_config(tmp.path()));

    let id = pipeline
        .publisher()
        .publish(&bad_votes_movie(1, "Counted"))
        .unwrap()
        .unwrap();

    indexer.start().unwrap();
    assert!(wait_until(WAIT, || recording.acked(MOVIES, SUGGEST_GROUP, id)));
    indexer.stop();

    let labels = pipeline
        .suggest()
        .suggest("movies", "count", SuggestOptions::default())
        .unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].label, "Counted");
    assert_eq!(labels[0].payload, "1");
    assert!(!recording.acked(MOVIES, SEARCH_GROUP, id));
}

#[test]
fn test_operator_ack_unblocks_the_search_group() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (pipeline, recording, indexer) = recorded_indexer(test_config(tmp.path()));
    let publisher = pipeline.publisher();

    let poison = publisher
        .publish(&bad_votes_movie(1, "Counted"))
        .unwrap()
        .unwrap();
    publisher.publish(&movie_create(2, "Heat")).unwrap();

    indexer.start().unwrap();
    assert!(wait_until(WAIT, || recording.read_count(SEARCH_GROUP) >= 5));

    // the poison entry is redelivered first, so later entries wait
    assert!(pipeline.search().get("movies", "2").unwrap().is_none());

    assert!(pipeline
        .log()
        .acknowledge(MOVIES, SEARCH_GROUP, poison)
        .unwrap());
    assert!(wait_until(WAIT, || pipeline
        .search()
        .get("movies", "2")
        .unwrap()
        .is_some()));
    indexer.stop();

    assert!(pipeline.search().get("movies", "1").unwrap().is_none());
}

#[test]
fn test_fulltext_toggle_resumes_where_it_stopped() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (pipeline, recording, indexer) = recorded_indexer(test_config(tmp.path()));
    let publisher = pipeline.publisher();

    let mut ids = Vec::new();
    for (id, title) in [(1, "Ronin"), (2, "Heat")] {
        ids.push(publisher.publish(&movie_create(id, title)).unwrap().unwrap());
    }
    indexer.start().unwrap();
    assert!(wait_until(WAIT, || ids.iter().all(|id| {
        recording.acked(MOVIES, SEARCH_GROUP, *id) && recording.acked(MOVIES, SUGGEST_GROUP, *id)
    })));

    let outcome = indexer.set_fulltext_enabled(false).unwrap();
    assert!(!outcome.fulltext);
    assert!(outcome.suggest);
    assert_eq!(outcome.state, LoopState::Running);

    let late = publisher
        .publish(&movie_create(3, "Alien"))
        .unwrap()
        .unwrap();
    ids.push(late);

    let suggested = |prefix: &str| {
        pipeline
            .suggest()
            .suggest("movies", prefix, SuggestOptions::default())
            .unwrap()
            .len()
    };
    assert!(wait_until(WAIT, || suggested("alien") == 1));
    assert_eq!(pipeline.search().doc_count("movies").unwrap(), 2);
    // nothing was read for the disabled group
    assert!(!recording.acked(MOVIES, SEARCH_GROUP, late));
    assert!(pipeline.log().pending(MOVIES, SEARCH_GROUP).unwrap().is_empty());

    let outcome = indexer.set_fulltext_enabled(true).unwrap();
    assert!(outcome.fulltext);
    assert_eq!(outcome.state, LoopState::Running);
    assert!(wait_until(WAIT, || pipeline
        .search()
        .doc_count("movies")
        .unwrap()
        == 3));
    indexer.stop();

    // each group handled every entry once across both restarts
    for id in &ids {
        assert_eq!(recording.ack_count(MOVIES, SEARCH_GROUP, *id), 1);
        assert_eq!(recording.ack_count(MOVIES, SUGGEST_GROUP, *id), 1);
    }
    assert_eq!(suggested(""), 3);
}

#[test]
fn test_stop_ends_a_long_backoff() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.backoff_short_ms = 60_000;
    config.backoff_long_ms = 60_000;
    let (_pipeline, recording, indexer) = recorded_indexer(config);

    indexer.start().unwrap();
    // one empty pass over both topics, then the session backs off
    assert!(wait_until(WAIT, || recording.read_count(SEARCH_GROUP) >= 2));

    let started = Instant::now();
    assert_eq!(indexer.stop(), LoopState::Stopped);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(recording.read_count(SUGGEST_GROUP), 0);
}

#[test]
fn test_toggle_on_stopped_loop_stays_stopped() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (_pipeline, _recording, indexer) = recorded_indexer(test_config(tmp.path()));

    let outcome = indexer.set_suggest_enabled(false).unwrap();
    assert_eq!(outcome.state, LoopState::Stopped);
    assert!(!outcome.suggest);
    assert!(!indexer.flags().suggest);

    // the next session runs with the stored flags
    indexer.start().unwrap();
    assert!(!indexer.status().suggest);
    indexer.stop();
}

#[test]
fn test_transport_error_stops_the_loop() {
    init_tracing();
    let tmp = TempDir::new().unwrap();
    let (_pipeline, recording, indexer) = recorded_indexer(test_config(tmp.path()));

    indexer.start().unwrap();
    recording.fail_reads.store(true, Ordering::SeqCst);

    assert!(wait_until(WAIT, || indexer.state() == LoopState::Stopped));
    let status = indexer.status();
    assert_eq!(status.state, LoopState::Stopped);
    assert!(status
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("connection reset"));

    // a fresh start clears the error once the log is reachable again
    recording.fail_reads.store(false, Ordering::SeqCst);
    assert_eq!(indexer.start().unwrap(), LoopState::Running);
    assert_eq!(indexer.status().last_error, None);
    indexer.stop();
}
