//! Phase State Machine (§4.7): the reverse/forward lifecycle gating when a
//! project may begin forward (patch-planning-and-beyond) work. Everything
//! downstream of this core reads `current_phase` to decide whether it may
//! run at all; this crate only owns the state transitions, not what happens
//! in either phase.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use lanea_git::GitSurface;
use lanea_staleness::{StalenessThreshold, evaluate_scope_staleness};
use lanea_utils::atomic_write::write_file_atomic;
use lanea_utils::canonicalization::emit_jcs;
use lanea_utils::jsonl::read_json_opt;
use lanea_utils::paths::{forward_blocked_path, phase_state_path};
use lanea_utils::types::{CurrentPhase, PhaseHalf, PhaseHalfStatus, PhaseState, Scope, RepositoryRegistry};
use lanea_validation::Validate;
use serde::{Deserialize, Serialize};

/// Artifact written at `ai/lane_a/phases/FORWARD_BLOCKED.json` whenever a
/// forward kickoff is refused. Sorted `reasons` per §4.7.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardBlocked {
    pub reasons: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

/// Structured outcome of a gated phase operation (§7 "Gate-refusal": never
/// raised as an error).
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    pub ok: bool,
    pub reasons: Vec<String>,
    pub state: Option<PhaseState>,
}

fn load() -> Result<PhaseState> {
    Ok(read_json_opt(&phase_state_path())?.unwrap_or_default())
}

fn persist(state: &PhaseState) -> Result<PhaseState> {
    let outcome = state.clone().validate();
    if !outcome.ok {
        anyhow::bail!("phase state failed validation: {}", outcome.errors.join("; "));
    }
    let normalized = outcome.normalized.expect("ok implies normalized");
    let json = emit_jcs(&normalized).context("canonicalizing phase state")?;
    let path = phase_state_path();
    write_file_atomic(&path, &json).with_context(|| format!("writing {path}"))?;
    Ok(normalized)
}

fn clear_forward_blocked() -> Result<()> {
    let path = forward_blocked_path();
    if path.as_std_path().exists() {
        std::fs::remove_file(path.as_std_path()).with_context(|| format!("removing {path}"))?;
    }
    Ok(())
}

fn write_forward_blocked(reasons: Vec<String>, now: DateTime<Utc>) -> Result<()> {
    let mut reasons = reasons;
    reasons.sort();
    reasons.dedup();
    let artifact = ForwardBlocked { reasons, checked_at: now };
    let json = emit_jcs(&artifact).context("canonicalizing FORWARD_BLOCKED artifact")?;
    let path = forward_blocked_path();
    write_file_atomic(&path, &json).with_context(|| format!("writing {path}"))
}

/// Kick off the reverse half of the lifecycle. Idempotent: if reverse is
/// already `in_progress`, returns the state unchanged.
pub fn kickoff_reverse(by: &str, now: DateTime<Utc>) -> Result<PhaseState> {
    let mut state = load()?;
    if state.current_phase == Some(CurrentPhase::Reverse)
        && state.reverse.status == Some(PhaseHalfStatus::InProgress)
    {
        return Ok(state);
    }
    state.current_phase = Some(CurrentPhase::Reverse);
    state.reverse = PhaseHalf {
        status: Some(PhaseHalfStatus::InProgress),
        started_at: Some(now),
        closed_at: None,
        closed_by: None,
        session_id: state.reverse.session_id.clone(),
        notes: Some(format!("kicked off by {by}")),
    };
    persist(&state)
}

/// Kick off the forward half. Refuses unless reverse is closed and all
/// prerequisites hold; writes `FORWARD_BLOCKED.json` on refusal, enumerating
/// every failing reason (not just the first), sorted (§4.7, scenario S6).
pub fn kickoff_forward(by: &str, now: DateTime<Utc>) -> Result<PhaseOutcome> {
    let mut state = load()?;

    let mut reasons = Vec::new();
    if state.reverse.status != Some(PhaseHalfStatus::Closed) {
        reasons.push("reverse_not_closed".to_string());
    }
    if !state.prereqs.scan_complete {
        reasons.push("scan_incomplete".to_string());
    }
    if !state.prereqs.sufficiency {
        reasons.push("sufficiency_not_confirmed".to_string());
    }
    if !state.prereqs.human_confirmed_v1 {
        reasons.push("human_not_confirmed_v1".to_string());
    }

    if !reasons.is_empty() {
        write_forward_blocked(reasons.clone(), now)?;
        reasons.sort();
        reasons.dedup();
        return Ok(PhaseOutcome {
            ok: false,
            reasons,
            state: Some(state),
        });
    }

    state.current_phase = Some(CurrentPhase::Forward);
    state.forward = PhaseHalf {
        status: Some(PhaseHalfStatus::InProgress),
        started_at: Some(now),
        closed_at: None,
        closed_by: None,
        session_id: state.forward.session_id.clone(),
        notes: Some(format!("kicked off by {by}")),
    };
    let state = persist(&state)?;
    clear_forward_blocked()?;

    Ok(PhaseOutcome {
        ok: true,
        reasons: Vec::new(),
        state: Some(state),
    })
}

/// Human confirmation that knowledge version 1 is ready for forward work.
/// Only takes effect if `prereqs.sufficiency` is already true.
pub fn confirm_v1(by: &str, notes: Option<&str>, now: DateTime<Utc>) -> Result<PhaseOutcome> {
    let mut state = load()?;

    if !state.prereqs.sufficiency {
        return Ok(PhaseOutcome {
            ok: false,
            reasons: vec!["sufficiency_not_confirmed".to_string()],
            state: Some(state),
        });
    }

    state.prereqs.human_confirmed_v1 = true;
    state.prereqs.human_confirmed_at = Some(now);
    state.prereqs.human_confirmed_by = Some(by.to_string());
    state.prereqs.human_notes = notes.map(str::to_string);

    let state = persist(&state)?;
    Ok(PhaseOutcome {
        ok: true,
        reasons: Vec::new(),
        state: Some(state),
    })
}

/// Close one half of the lifecycle.
pub fn close(phase: CurrentPhase, by: &str, now: DateTime<Utc>) -> Result<PhaseState> {
    let mut state = load()?;
    let half = match phase {
        CurrentPhase::Reverse => &mut state.reverse,
        CurrentPhase::Forward => &mut state.forward,
    };
    half.status = Some(PhaseHalfStatus::Closed);
    half.closed_at = Some(now);
    half.closed_by = Some(by.to_string());
    persist(&state)
}

/// Recompute `prereqs.scan_complete` and `prereqs.sufficiency` from current
/// reality, without mutating any `human_confirmed_*` field.
pub fn refresh_prereqs(
    knowledge_version: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<PhaseState> {
    let mut state = load()?;

    let staleness = evaluate_scope_staleness(&Scope::system(), now, registry, git, threshold)?;
    state.prereqs.scan_complete = !staleness.reasons.iter().any(|r| r == "coverage_incomplete");
    state.prereqs.sufficiency = lanea_sufficiency::is_sufficient_for(&Scope::system(), knowledge_version)?;

    persist(&state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use lanea_git::fake::FakeGit;
    use lanea_utils::paths::with_isolated_home;
    use lanea_utils::types::{RepoCommands, RepoEntry, RepoStatus};
    use std::collections::BTreeMap;

    fn registry() -> RepositoryRegistry {
        let mut repos = BTreeMap::new();
        repos.insert(
            "repo-a".to_string(),
            RepoEntry {
                path: Utf8PathBuf::from("repo-a"),
                active_branch: "main".to_string(),
                team_id: "team-a".to_string(),
                kind: "service".to_string(),
                status: RepoStatus::Active,
                commands: RepoCommands {
                    cwd: Utf8PathBuf::from("."),
                    package_manager: "cargo".to_string(),
                    install: None,
                    lint: None,
                    test: None,
                    build: None,
                },
            },
        );
        RepositoryRegistry {
            base_dir: Utf8PathBuf::from("/repos"),
            repos,
        }
    }

    #[test]
    fn kickoff_reverse_is_idempotent() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let first = kickoff_reverse("alice", now).unwrap();
        let second = kickoff_reverse("alice", now + chrono::Duration::minutes(1)).unwrap();
        assert_eq!(first.reverse.started_at, second.reverse.started_at);
    }

    #[test]
    fn forward_kickoff_blocked_when_reverse_not_closed() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        kickoff_reverse("alice", now).unwrap();

        let outcome = kickoff_forward("alice", now).unwrap();
        assert!(!outcome.ok);
        assert!(outcome.reasons.contains(&"reverse_not_closed".to_string()));

        let artifact: ForwardBlocked = read_json_opt(&forward_blocked_path()).unwrap().unwrap();
        assert!(artifact.reasons.contains(&"reverse_not_closed".to_string()));
    }

    #[test]
    fn forward_kickoff_succeeds_once_all_prereqs_hold() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        kickoff_reverse("alice", now).unwrap();
        close(CurrentPhase::Reverse, "alice", now).unwrap();

        let registry = registry();
        let git = FakeGit::new();
        // No repo index/scan written: coverage incomplete, so refresh_prereqs
        // leaves scan_complete = false and sufficiency = false.
        refresh_prereqs("v0", now, &registry, &git, StalenessThreshold::default()).unwrap();

        let blocked = kickoff_forward("alice", now).unwrap();
        assert!(!blocked.ok);
        assert!(blocked.reasons.contains(&"scan_incomplete".to_string()));

        // confirm_v1 refuses while sufficiency is false.
        let confirm = confirm_v1("alice", None, now).unwrap();
        assert!(!confirm.ok);
    }

    #[test]
    fn close_sets_status_and_timestamps() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        kickoff_reverse("alice", now).unwrap();
        let state = close(CurrentPhase::Reverse, "alice", now).unwrap();
        assert_eq!(state.reverse.status, Some(PhaseHalfStatus::Closed));
        assert_eq!(state.reverse.closed_by.as_deref(), Some("alice"));
    }
}
