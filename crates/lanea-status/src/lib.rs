//! Work Status Checkpoint (§4.10): per-work-item stage tracking.
//!
//! `update` is a read-modify-write: it loads the previous `STATUS.json` (if
//! any), appends a history entry when the stage actually changes, merges in
//! the caller's `artifacts`/`repos` partial updates, preserves the prior
//! full snapshot in a sibling `status-history.json` array before
//! overwriting, and writes both `STATUS.json` and a `STATUS.md` rendering
//! with the same JSON embedded between sentinel comments.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use lanea_utils::atomic_write::write_file_atomic;
use lanea_utils::canonicalization::emit_jcs;
use lanea_utils::jsonl::read_json_opt;
use lanea_utils::paths::{work_status_history_path, work_status_md_path, work_status_path};
use lanea_utils::types::{WorkStatus, WorkStatusHistoryEntry};
use lanea_validation::Validate;

/// The closed set of Work Stage tokens (glossary). Not enforced by
/// `update` — callers may be ahead of this list's last revision — but
/// kept here as the single reference copy.
pub const WORK_STAGES: &[&str] = &[
    "INTAKE_RECEIVED",
    "ROUTED",
    "TASKS_CREATED",
    "SWEEP_READY",
    "PROPOSED",
    "BUNDLED",
    "PATCH_PLANNED",
    "QA_PLANNED",
    "APPLY_APPROVAL_PENDING",
    "APPLY_APPROVAL_GRANTED",
    "APPLY_APPROVAL_DENIED",
    "APPLYING",
    "APPLIED",
    "CI_PENDING",
    "CI_FAILED",
    "CI_FIXING",
    "CI_GREEN",
    "MERGE_APPROVAL_PENDING",
    "MERGE_APPROVAL_GRANTED",
    "MERGE_APPROVAL_DENIED",
    "MERGED",
    "DONE",
    "FAILED",
    "BLOCKED",
];

const SNAPSHOT_BEGIN: &str = "<!-- STATUS_SNAPSHOT_BEGIN -->";
const SNAPSHOT_END: &str = "<!-- STATUS_SNAPSHOT_END -->";

/// Read the current checkpoint, if one has ever been written.
pub fn read_current(work_id: &str) -> Result<Option<WorkStatus>> {
    read_json_opt(&work_status_path(work_id))
}

/// Read-modify-write a work item's checkpoint.
///
/// `artifacts`/`repos` are merged into the previous maps (new keys added,
/// existing keys overwritten) rather than replacing them outright, so a
/// caller reporting one new artifact need not resend the whole set.
#[allow(clippy::too_many_arguments)]
pub fn update(
    work_id: &str,
    stage: &str,
    note: Option<&str>,
    blocked: bool,
    blocking_reason: Option<&str>,
    artifacts: BTreeMap<String, String>,
    repos: BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<WorkStatus> {
    let previous = read_current(work_id)?;

    let stage_changed = previous
        .as_ref()
        .map(|p| p.current_stage != stage)
        .unwrap_or(true);

    let mut history = previous
        .as_ref()
        .map(|p| p.history.clone())
        .unwrap_or_default();
    if stage_changed {
        history.push(WorkStatusHistoryEntry {
            timestamp: now,
            stage: stage.to_string(),
            note: note.map(str::to_string),
        });
    }

    let mut merged_artifacts = previous
        .as_ref()
        .map(|p| p.artifacts.clone())
        .unwrap_or_default();
    merged_artifacts.extend(artifacts);

    let mut merged_repos = previous
        .as_ref()
        .map(|p| p.repos.clone())
        .unwrap_or_default();
    merged_repos.extend(repos);

    let candidate = WorkStatus {
        work_id: work_id.to_string(),
        current_stage: stage.to_string(),
        last_updated: now,
        blocked,
        blocking_reason: blocking_reason.map(str::to_string),
        artifacts: merged_artifacts,
        repos: merged_repos,
        history,
    };

    if let Some(prev) = &previous {
        append_snapshot(work_id, prev)?;
    }

    persist(candidate)
}

/// Append the previous full `WorkStatus` to the rolling `status-history.json`
/// array, creating it if absent. Called before `update` overwrites
/// `STATUS.json`, so the array holds every prior snapshot, oldest first.
fn append_snapshot(work_id: &str, previous: &WorkStatus) -> Result<()> {
    let path = work_status_history_path(work_id);
    let mut snapshots: Vec<WorkStatus> = read_json_opt(&path)?.unwrap_or_default();
    snapshots.push(previous.clone());
    let json = emit_jcs(&snapshots)?;
    write_file_atomic(&path, &json)?;
    Ok(())
}

fn persist(candidate: WorkStatus) -> Result<WorkStatus> {
    let outcome = candidate.validate();
    if !outcome.ok {
        bail!("work status failed validation: {}", outcome.errors.join("; "));
    }
    let status = outcome.normalized.expect("ok outcome carries a value");

    let json = emit_jcs(&status)?;
    write_file_atomic(&work_status_path(&status.work_id), &json)?;
    write_file_atomic(
        &work_status_md_path(&status.work_id),
        &render_markdown(&status, &json),
    )?;
    Ok(status)
}

fn render_markdown(status: &WorkStatus, json: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Work status: {}\n\n", status.work_id));
    out.push_str(&format!("- current stage: `{}`\n", status.current_stage));
    out.push_str(&format!("- last updated: {}\n", status.last_updated));
    out.push_str(&format!("- blocked: {}\n", status.blocked));
    if let Some(reason) = &status.blocking_reason {
        out.push_str(&format!("- blocking reason: {reason}\n"));
    }
    if !status.artifacts.is_empty() {
        out.push_str("\n## Artifacts\n\n");
        for (key, value) in &status.artifacts {
            out.push_str(&format!("- {key}: {value}\n"));
        }
    }
    if !status.repos.is_empty() {
        out.push_str("\n## Repos\n\n");
        for (repo_id, sha) in &status.repos {
            out.push_str(&format!("- {repo_id}: {sha}\n"));
        }
    }
    out.push_str("\n## History\n\n");
    for entry in &status.history {
        match &entry.note {
            Some(note) => out.push_str(&format!("- {} — `{}` ({note})\n", entry.timestamp, entry.stage)),
            None => out.push_str(&format!("- {} — `{}`\n", entry.timestamp, entry.stage)),
        }
    }
    out.push_str(&format!("\n{SNAPSHOT_BEGIN}\n{json}\n{SNAPSHOT_END}\n"));
    out
}
