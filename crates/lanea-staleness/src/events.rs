//! Merge event segments (§4.3 step 4, §6 "Event segment format"):
//! externally-produced, append-only JSONL files under
//! `ai/lane_a/events/segments/`. Readers only care about `type = "merge"`
//! lines; segment filenames must sort lexicographically in chronological
//! order, and readers tolerate either of two historical naming schemes.

use anyhow::{Context, Result};
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lanea_utils::jsonl::{read_jsonl, recent_files_by_name};

/// Bound on how many of the most-recent segment files a scan will open
/// (§4.3 step 4: "scan at most 48 most-recent files").
pub const MAX_SEGMENT_FILES_SCANNED: usize = 48;

/// One line of an event segment file. Only `event_type`/`repo_id`/
/// `timestamp` are load-bearing for staleness; everything else passes
/// through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub repo_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SegmentEvent {
    #[must_use]
    pub fn is_merge(&self) -> bool {
        self.event_type == "merge"
    }
}

/// A segment filename is either `events-YYYYMMDD-HH.jsonl` or the older
/// bare `YYYYMMDD-HHMMSS.jsonl` shape.
fn is_segment_file(name: &str) -> bool {
    name.ends_with(".jsonl")
}

/// Latest `type = "merge", repo_id = repo_id` timestamp across the most
/// recent segment files, or `None` if no such event is found (absence is
/// not an error: a repo with no recorded merges is simply not
/// merge-event-stale).
pub fn latest_merge_event_time_for_repo(
    segments_dir: &Utf8Path,
    repo_id: &str,
) -> Result<Option<DateTime<Utc>>> {
    let files = recent_files_by_name(segments_dir, MAX_SEGMENT_FILES_SCANNED, is_segment_file)
        .with_context(|| format!("listing event segments in {segments_dir}"))?;

    let mut latest: Option<DateTime<Utc>> = None;
    for file in files {
        let events: Vec<SegmentEvent> =
            read_jsonl(&file).with_context(|| format!("reading event segment {file}"))?;
        for event in events {
            if event.is_merge() && event.repo_id.as_deref() == Some(repo_id) {
                latest = Some(latest.map_or(event.timestamp, |cur| cur.max(event.timestamp)));
            }
        }
    }
    Ok(latest)
}
