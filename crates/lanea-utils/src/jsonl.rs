//! Append-only JSONL sidecars (§4.1 "JSONL sidecars are append-only; lines
//! are single-line JSON terminated with `\n`").
//!
//! Appending opens in `O_APPEND` mode and fsyncs before returning so a crash
//! mid-append cannot truncate a previously-committed line; this is weaker
//! than the temp-then-rename discipline used for whole-file artifacts
//! (§4.1 only mandates that discipline for non-sidecar files) but keeps the
//! same "never read back a write without going through the filesystem"
//! rule, since callers always re-read the file to see their own append.

use std::fs::OpenOptions;
use std::io::Write;

use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::paths::ensure_dir_all;

/// Append one JSON value as a single line, creating the file (and parent
/// directories) if needed.
pub fn append_jsonl_line<T: Serialize>(path: &Utf8Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir_all(parent).with_context(|| format!("creating parent dir for {path}"))?;
    }
    let line = serde_json::to_string(value).with_context(|| "serializing JSONL line")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .with_context(|| format!("opening {path} for append"))?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()
        .with_context(|| format!("fsyncing {path} after append"))?;
    Ok(())
}

/// Read every line of a JSONL file as `T`, skipping blank lines. Returns an
/// empty vec if the file does not exist (an append-only sidecar with no
/// writes yet is indistinguishable from "not started").
pub fn read_jsonl<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>> {
    if !path.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path.as_std_path())
        .with_context(|| format!("reading {path}"))?;
    let mut out = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: T = serde_json::from_str(line)
            .with_context(|| format!("{path}: invalid JSON on line {}", lineno + 1))?;
        out.push(value);
    }
    Ok(out)
}

/// Read and parse a whole JSON file. `Ok(None)` means the file does not
/// exist (absent, not an error); a present-but-unparseable file is an error
/// the caller should treat as "invalid", per §4.2.
pub fn read_json_opt<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>> {
    if !path.as_std_path().exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path.as_std_path()).with_context(|| format!("reading {path}"))?;
    let value: T =
        serde_json::from_str(&content).with_context(|| format!("{path}: invalid JSON"))?;
    Ok(Some(value))
}

/// Read at most the `limit` most-recently-named files in `dir` matching
/// `predicate`, sorted lexicographically ascending (oldest of the window
/// first) — used for the event-segment scan in §4.3 step 4 ("scan at most
/// 48 most-recent files").
pub fn recent_files_by_name(
    dir: &Utf8Path,
    limit: usize,
    predicate: impl Fn(&str) -> bool,
) -> Result<Vec<camino::Utf8PathBuf>> {
    if !dir.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(dir.as_std_path())
        .with_context(|| format!("reading dir {dir}"))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| predicate(name))
        .collect();
    names.sort();
    let start = names.len().saturating_sub(limit);
    Ok(names[start..].iter().map(|n| dir.join(n)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Line {
        n: u32,
    }

    #[test]
    fn append_then_read_roundtrips_in_order() {
        let dir = TempDir::new().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("x.jsonl");
        append_jsonl_line(&path, &Line { n: 1 }).unwrap();
        append_jsonl_line(&path, &Line { n: 2 }).unwrap();
        let lines: Vec<Line> = read_jsonl(&path).unwrap();
        assert_eq!(lines, vec![Line { n: 1 }, Line { n: 2 }]);
    }

    #[test]
    fn read_jsonl_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("missing.jsonl");
        let lines: Vec<Line> = read_jsonl(&path).unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn recent_files_by_name_caps_and_sorts() {
        let dir = TempDir::new().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        for n in 0..5 {
            std::fs::write(root.join(format!("events-{n}.jsonl")).as_std_path(), "").unwrap();
        }
        let found = recent_files_by_name(root, 3, |n| n.starts_with("events-")).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found[0].as_str().ends_with("events-2.jsonl"));
        assert!(found[2].as_str().ends_with("events-4.jsonl"));
    }
}
