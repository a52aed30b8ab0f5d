use super::group::{GroupState, PendingEntry};
use super::{ChangeLog, GroupCreated, StartPosition, StreamEntry};
use crate::error::{Result, StreamdexError};
use crate::types::EntryId;
use crate::utils::{path_component, save_json_atomic};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const SEGMENT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const GROUPS_DIR: &str = "groups";
const TRIM_MARKER: &str = "trimmed.json";

struct ActiveSegment {
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    id: u32,
}

struct SealedSegment {
    path: PathBuf,
    last_entry: EntryId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrimMarker {
    last_trimmed: EntryId,
}

struct TopicState {
    entries: Vec<StreamEntry>,
    last_id: EntryId,
    sealed: Vec<SealedSegment>,
    active: ActiveSegment,
    groups: HashMap<String, GroupState>,
}

impl TopicState {
    fn group_mut(&mut self, topic: &str, group: &str) -> Result<&mut GroupState> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| StreamdexError::GroupNotFound {
                topic: topic.to_string(),
                group: group.to_string(),
            })
    }

    /// Pending entries first, then entries past the group's cursor.
    fn deliver(
        &mut self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<(Vec<StreamEntry>, bool)> {
        let now = Utc::now();
        let TopicState { entries, groups, .. } = self;
        let state = groups
            .get_mut(group)
            .ok_or_else(|| StreamdexError::GroupNotFound {
                topic: topic.to_string(),
                group: group.to_string(),
            })?;

        let mut batch = Vec::new();
        let mut changed = false;

        let pending_ids: Vec<EntryId> = state.pending.keys().copied().collect();
        for id in pending_ids {
            if batch.len() >= count {
                break;
            }
            match entries.binary_search_by_key(&id, |e| e.id) {
                Ok(pos) => {
                    state.redeliver(id, consumer, now);
                    batch.push(entries[pos].clone());
                }
                Err(_) => {
                    // trimmed away while pending
                    state.pending.remove(&id);
                }
            }
            changed = true;
        }

        let start = entries.partition_point(|e| e.id <= state.last_delivered);
        for entry in &entries[start..] {
            if batch.len() >= count {
                break;
            }
            state.deliver_new(entry.id, consumer, now);
            batch.push(entry.clone());
            changed = true;
        }

        Ok((batch, changed))
    }
}

struct TopicLog {
    name: String,
    dir: PathBuf,
    segment_max_bytes: u64,
    state: Mutex<TopicState>,
    appended: Condvar,
}

impl TopicLog {
    fn open(name: &str, dir: &Path, segment_max_bytes: u64) -> Result<Self> {
        fs::create_dir_all(dir.join(GROUPS_DIR))?;

        let segments = list_segments(dir)?;
        if let Some((_, active)) = segments.last() {
            truncate_torn_tail(name, active)?;
        }
        let mut entries = Vec::new();
        let mut sealed = Vec::new();
        let mut last_id = read_trim_marker(dir)?.last_trimmed;

        for (i, (_, path)) in segments.iter().enumerate() {
            let loaded = read_segment(name, path)?;
            let last_entry = loaded.last().map(|e| e.id).unwrap_or(0);
            last_id = last_id.max(last_entry);
            entries.extend(loaded);
            if i + 1 < segments.len() {
                sealed.push(SealedSegment {
                    path: path.clone(),
                    last_entry,
                });
            }
        }
        entries.sort_by_key(|e| e.id);
        entries.dedup_by_key(|e| e.id);

        let (active_id, active_path) = match segments.last() {
            Some((id, path)) => (*id, path.clone()),
            None => (1, dir.join(segment_name(1))),
        };
        let size = active_path.metadata().map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)?;

        let groups = load_groups(&dir.join(GROUPS_DIR))?;
        // ids a group has already been handed are never reissued
        if let Some(cursor) = groups.values().map(|g| g.last_delivered).max() {
            if cursor > last_id {
                tracing::warn!(
                    "[LOG {}] group cursor {} is past the last stored id {}",
                    name,
                    cursor,
                    last_id
                );
                last_id = cursor;
            }
        }

        tracing::info!(
            "[LOG {}] opened: {} entries, {} segments, {} groups, last id {}",
            name,
            entries.len(),
            segments.len().max(1),
            groups.len(),
            last_id
        );

        Ok(TopicLog {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            segment_max_bytes,
            state: Mutex::new(TopicState {
                entries,
                last_id,
                sealed,
                active: ActiveSegment {
                    writer: BufWriter::new(file),
                    path: active_path,
                    size,
                    id: active_id,
                },
                groups,
            }),
            appended: Condvar::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, TopicState>> {
        self.state
            .lock()
            .map_err(|_| StreamdexError::Transport(format!("topic {} lock poisoned", self.name)))
    }

    fn group_path(&self, group: &str) -> PathBuf {
        self.dir
            .join(GROUPS_DIR)
            .join(format!("{}.json", path_component(group)))
    }

    fn rotate_locked(&self, state: &mut TopicState) -> Result<()> {
        let seg = &mut state.active;
        seg.writer.flush()?;
        let sealed_path = seg.path.clone();
        seg.id += 1;
        let new_path = self.dir.join(segment_name(seg.id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&new_path)?;
        seg.writer = BufWriter::new(file);
        seg.path = new_path;
        seg.size = 0;

        state.sealed.push(SealedSegment {
            path: sealed_path,
            last_entry: state.last_id,
        });
        tracing::debug!("[LOG {}] rotated to segment {}", self.name, state.active.id);
        Ok(())
    }
}

/// Durable [`ChangeLog`] on the local filesystem.
///
/// Every topic lives in its own directory under the root, as a sequence of
/// `segment_NNNN.jsonl` files plus one JSON file per consumer group. Topics
/// are loaded into memory on first access.
pub struct FileChangeLog {
    root: PathBuf,
    segment_max_bytes: u64,
    topics: DashMap<String, Arc<TopicLog>>,
}

impl FileChangeLog {
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_segment_size(root, SEGMENT_MAX_BYTES)
    }

    /// Like [`FileChangeLog::open`] with a custom segment rotation size.
    pub fn open_with_segment_size(root: impl AsRef<Path>, segment_max_bytes: u64) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(FileChangeLog {
            root,
            segment_max_bytes: segment_max_bytes.max(1),
            topics: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn topic_dir(&self, topic: &str) -> PathBuf {
        self.root.join(path_component(topic))
    }

    fn topic(&self, topic: &str, create: bool) -> Result<Option<Arc<TopicLog>>> {
        if let Some(log) = self.topics.get(topic) {
            return Ok(Some(log.clone()));
        }

        let dir = self.topic_dir(topic);
        if !create && !dir.is_dir() {
            return Ok(None);
        }

        match self.topics.entry(topic.to_string()) {
            Entry::Occupied(o) => Ok(Some(o.get().clone())),
            Entry::Vacant(v) => {
                let log = Arc::new(TopicLog::open(topic, &dir, self.segment_max_bytes)?);
                v.insert(log.clone());
                Ok(Some(log))
            }
        }
    }

    fn existing_topic(&self, topic: &str) -> Result<Arc<TopicLog>> {
        self.topic(topic, false)?
            .ok_or_else(|| StreamdexError::TopicNotFound(topic.to_string()))
    }

    /// Remove sealed segments whose entries all have ids below `before_id`.
    /// The active segment is never removed. Returns the number of segments
    /// deleted.
    pub fn trim_before(&self, topic: &str, before_id: EntryId) -> Result<usize> {
        let log = self.existing_topic(topic)?;
        let mut state = log.lock()?;

        let mut removed = 0usize;
        let mut last_trimmed = 0;
        let mut kept = Vec::with_capacity(state.sealed.len());
        for segment in std::mem::take(&mut state.sealed) {
            if segment.last_entry > 0 && segment.last_entry < before_id {
                fs::remove_file(&segment.path)?;
                last_trimmed = last_trimmed.max(segment.last_entry);
                removed += 1;
            } else {
                kept.push(segment);
            }
        }
        state.sealed = kept;

        if removed > 0 {
            let cut = state.entries.partition_point(|e| e.id <= last_trimmed);
            state.entries.drain(..cut);
            save_json_atomic(&log.dir.join(TRIM_MARKER), &TrimMarker { last_trimmed })?;
            tracing::info!(
                "[LOG {}] trimmed {} segments up to id {}",
                topic,
                removed,
                last_trimmed
            );
        }

        Ok(removed)
    }

    /// Id of the newest entry ever appended to `topic`.
    pub fn last_id(&self, topic: &str) -> Result<EntryId> {
        let log = self.existing_topic(topic)?;
        let state = log.lock()?;
        Ok(state.last_id)
    }
}

impl ChangeLog for FileChangeLog {
    fn append(&self, topic: &str, fields: IndexMap<String, String>) -> Result<EntryId> {
        let log = self
            .topic(topic, true)?
            .ok_or_else(|| StreamdexError::TopicNotFound(topic.to_string()))?;
        let mut state = log.lock()?;

        let entry = StreamEntry {
            id: state.last_id + 1,
            timestamp_ms: Utc::now().timestamp_millis().max(0) as u64,
            fields,
        };
        let line = serde_json::to_string(&entry)?;

        let seg = &mut state.active;
        seg.writer.write_all(line.as_bytes())?;
        seg.writer.write_all(b"\n")?;
        seg.writer.flush()?;
        seg.size += line.len() as u64 + 1;

        let id = entry.id;
        state.last_id = id;
        state.entries.push(entry);

        if state.active.size >= log.segment_max_bytes {
            log.rotate_locked(&mut state)?;
        }
        drop(state);

        log.appended.notify_all();
        Ok(id)
    }

    fn ensure_group(
        &self,
        topic: &str,
        group: &str,
        start: StartPosition,
        create_topic: bool,
    ) -> Result<GroupCreated> {
        let log = self
            .topic(topic, create_topic)?
            .ok_or_else(|| StreamdexError::TopicNotFound(topic.to_string()))?;
        let mut state = log.lock()?;

        if state.groups.contains_key(group) {
            return Ok(GroupCreated::AlreadyExists);
        }

        let last_delivered = match start {
            StartPosition::Beginning => 0,
            StartPosition::Latest => state.last_id,
            StartPosition::After(id) => id,
        };
        let group_state = GroupState::starting_after(last_delivered);
        group_state.save(&log.group_path(group))?;
        state.groups.insert(group.to_string(), group_state);

        tracing::info!(
            "[LOG {}] created group {} after id {}",
            topic,
            group,
            last_delivered
        );
        Ok(GroupCreated::Created)
    }

    fn read_group(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let log = self.existing_topic(topic)?;
        let count = count.max(1);
        let deadline = Instant::now() + block;
        let mut state = log.lock()?;

        loop {
            let (batch, changed) = state.deliver(topic, group, consumer, count)?;
            if changed {
                state.group_mut(topic, group)?.save(&log.group_path(group))?;
            }

            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(batch);
            }
            let (guard, _) = log
                .appended
                .wait_timeout(state, deadline - now)
                .map_err(|_| StreamdexError::Transport(format!("topic {} lock poisoned", topic)))?;
            state = guard;
        }
    }

    fn acknowledge(&self, topic: &str, group: &str, id: EntryId) -> Result<bool> {
        let log = self.existing_topic(topic)?;
        let mut state = log.lock()?;
        let group_state = state.group_mut(topic, group)?;

        if !group_state.acknowledge(id) {
            return Ok(false);
        }
        group_state.save(&log.group_path(group))?;
        Ok(true)
    }

    fn pending(&self, topic: &str, group: &str) -> Result<Vec<PendingEntry>> {
        let log = self.existing_topic(topic)?;
        let mut state = log.lock()?;
        let group_state = state.group_mut(topic, group)?;
        Ok(group_state.pending.values().cloned().collect())
    }

    fn entry_count(&self, topic: &str) -> Result<usize> {
        match self.topic(topic, false)? {
            Some(log) => Ok(log.lock()?.entries.len()),
            None => Ok(0),
        }
    }
}

fn segment_name(id: u32) -> String {
    format!("segment_{:04}.jsonl", id)
}

fn list_segments(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut segments: Vec<(u32, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name();
            let id = name
                .to_str()?
                .strip_prefix("segment_")?
                .strip_suffix(".jsonl")?
                .parse::<u32>()
                .ok()?;
            Some((id, e.path()))
        })
        .collect();
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

fn read_segment(topic: &str, path: &Path) -> Result<Vec<StreamEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StreamEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(
                "[LOG {}] skipping unreadable line in {}: {}",
                topic,
                path.display(),
                e
            ),
        }
    }
    Ok(entries)
}

/// Cut the partial last line an interrupted append leaves behind, so the
/// next append starts on a line of its own.
fn truncate_torn_tail(topic: &str, path: &Path) -> Result<()> {
    let bytes = fs::read(path)?;
    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(());
    }
    let keep = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);
    tracing::warn!(
        "[LOG {}] dropping {} bytes of an unfinished append in {}",
        topic,
        bytes.len() - keep,
        path.display()
    );
    OpenOptions::new()
        .write(true)
        .open(path)?
        .set_len(keep as u64)?;
    Ok(())
}

fn read_trim_marker(dir: &Path) -> Result<TrimMarker> {
    let path = dir.join(TRIM_MARKER);
    if !path.exists() {
        return Ok(TrimMarker::default());
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn load_groups(dir: &Path) -> Result<HashMap<String, GroupState>> {
    let mut groups = HashMap::new();
    for entry in fs::read_dir(dir)?.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(stem) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".json"))
        else {
            continue;
        };
        if stem.starts_with(".tmp") {
            continue;
        }
        let name = decode_component(stem);
        groups.insert(name, GroupState::load(&path)?);
    }
    Ok(groups)
}

/// Inverse of [`path_component`].
fn decode_component(component: &str) -> String {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'~' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(b) = decoded {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
