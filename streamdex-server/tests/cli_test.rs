#![allow(deprecated)] // Command::cargo_bin

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn streamdex_cmd(data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("streamdex").unwrap();
    cmd.env_remove("STREAMDEX_BIND_ADDR")
        .env_remove("STREAMDEX_STREAMS")
        .env_remove("STREAMDEX_FULLTEXT")
        .env_remove("STREAMDEX_SUGGEST")
        .env("STREAMDEX_DATA_DIR", data_dir.path());
    cmd
}

const CREATE: &str = r#"{"topic":"dbserver1.inventory.movies","key":{"movie_id":1},"value":{"before":null,"after":{"movie_id":1,"title":"Heat","genre":"Crime"},"source":{"db":"inventory","table":"movies"},"op":"c"}}"#;
const FOREIGN: &str = r#"{"topic":"other.inventory.movies","key":{"movie_id":2},"value":{"before":null,"after":{"movie_id":2,"title":"Ronin","genre":"Crime"},"source":{"db":"inventory","table":"movies"},"op":"c"}}"#;

#[test]
fn ingest_from_stdin_reports_counts() {
    let tmp = TempDir::new().unwrap();

    streamdex_cmd(&tmp)
        .args(["ingest", "-"])
        .write_stdin(format!("{}\n{}\n", CREATE, FOREIGN))
        .assert()
        .success()
        .stdout(contains("published=1 filtered=1"));

    assert!(tmp.path().join("log").exists());
}

#[test]
fn ingest_from_file() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("records.jsonl");
    std::fs::write(&input, format!("{}\n{}\n", CREATE, CREATE)).unwrap();

    streamdex_cmd(&tmp)
        .arg("ingest")
        .arg(&input)
        .assert()
        .success()
        .stdout(contains("published=2 filtered=0"));
}

#[test]
fn ingest_missing_file_fails() {
    let tmp = TempDir::new().unwrap();

    streamdex_cmd(&tmp)
        .args(["ingest", "/definitely/not/here.jsonl"])
        .assert()
        .failure()
        .stderr(contains("cannot open"));
}

#[test]
fn help_lists_ingest() {
    let tmp = TempDir::new().unwrap();

    streamdex_cmd(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("ingest"))
        .stdout(contains("--autostart"));
}
