use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `value` as pretty JSON and replace `path` with it atomically.
///
/// The content goes to a temporary file in the same directory first, so a
/// reader never observes a half-written file.
pub fn save_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new().prefix(".tmp").tempfile_in(dir)?;
    tmp.write_all(&content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Turn an arbitrary name (topic, group, entity) into a single path
/// component. ASCII alphanumerics, `-`, `_` and `.` are kept; every other
/// byte becomes `~xx`.
pub fn path_component(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(b as char),
            b'.' if !out.is_empty() => out.push('.'),
            _ => out.push_str(&format!("~{:02x}", b)),
        }
    }
    out
}
