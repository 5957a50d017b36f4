//! Sufficiency Ledger (§4.6): per-`(scope, knowledge_version)` sufficiency
//! decisions. `propose` computes and records the current picture without
//! gating; `approve` gates on hard-staleness, scan coverage, and any open
//! Decision Packet for the scope; `reject` always succeeds and resets the
//! scope to `insufficient`. Every write appends an immutable history entry
//! and refreshes the scope's `LATEST` pointer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use lanea_git::GitSurface;
use lanea_packet::list_open_packets_for_scope;
use lanea_staleness::{StalenessThreshold, evaluate_scope_staleness};
use lanea_utils::atomic_write::write_file_atomic;
use lanea_utils::canonicalization::emit_jcs;
use lanea_utils::jsonl::read_json_opt;
use lanea_utils::paths::{sufficiency_history_dir, sufficiency_latest_path, sufficiency_scope_latest_path};
use lanea_utils::types::{
    Blocker, RepositoryRegistry, Scope, StaleStatus, SufficiencyRecord, SufficiencyStatus,
};
use lanea_validation::Validate;

/// Outcome of a gated operation (`approve`): a gate refusal is a structured
/// `ok: false` result, never a raised error (§7 "Gate-refusal").
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub ok: bool,
    pub message: Option<String>,
    pub record: Option<SufficiencyRecord>,
}

impl GateOutcome {
    fn refuse(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            record: None,
        }
    }

    fn accept(record: SufficiencyRecord) -> Self {
        Self {
            ok: true,
            message: None,
            record: Some(record),
        }
    }
}

fn scope_slug(scope: &Scope) -> String {
    scope.as_str().replace(':', "-")
}

fn latest_path(scope: &Scope) -> camino::Utf8PathBuf {
    if scope.is_system() {
        sufficiency_latest_path()
    } else {
        sufficiency_scope_latest_path(&scope_slug(scope))
    }
}

/// `coverage_complete` for a scope, derived from the same `reasons` set
/// `evaluateScopeStaleness` already computed: the tag `coverage_incomplete`
/// is pushed per-repo, so its absence across the (possibly aggregated)
/// reasons set means every repo in scope has both a `repo_index.json` and a
/// `scan.json` on disk.
fn coverage_complete(staleness: &lanea_utils::types::StalenessSnapshot) -> bool {
    !staleness.reasons.iter().any(|r| r == "coverage_incomplete")
}

fn stale_status_for(staleness: &lanea_utils::types::StalenessSnapshot) -> StaleStatus {
    if staleness.hard_stale {
        StaleStatus::HardStale
    } else if staleness.stale {
        StaleStatus::SoftStale
    } else {
        StaleStatus::Fresh
    }
}

fn history_path(scope: &Scope, knowledge_version: &str, now: DateTime<Utc>) -> camino::Utf8PathBuf {
    let stamp = now.format("%Y%m%dT%H%M%S%.3fZ");
    sufficiency_history_dir().join(format!(
        "SUFF-{}-{knowledge_version}-{stamp}.json",
        scope_slug(scope)
    ))
}

fn history_md_path(scope: &Scope, knowledge_version: &str, now: DateTime<Utc>) -> camino::Utf8PathBuf {
    let stamp = now.format("%Y%m%dT%H%M%S%.3fZ");
    sufficiency_history_dir().join(format!(
        "SUFF-{}-{knowledge_version}-{stamp}.md",
        scope_slug(scope)
    ))
}

fn render_markdown(record: &SufficiencyRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Sufficiency: {} @ {}\n\n", record.scope, record.knowledge_version));
    out.push_str(&format!("- status: {:?}\n", record.status));
    out.push_str(&format!("- stale_status: {:?}\n", record.stale_status));
    if let Some(by) = &record.decided_by {
        out.push_str(&format!("- decided_by: {by}\n"));
    }
    if let Some(at) = record.decided_at {
        out.push_str(&format!("- decided_at: {}\n", at.to_rfc3339()));
    }
    if !record.blockers.is_empty() {
        out.push_str("\n## Blockers\n\n");
        for b in &record.blockers {
            out.push_str(&format!("- `{}` {}: {}\n", b.id, b.title, b.details));
        }
    }
    out
}

fn persist(record: &SufficiencyRecord, now: DateTime<Utc>) -> Result<SufficiencyRecord> {
    let outcome = record.clone().validate();
    if !outcome.ok {
        anyhow::bail!("sufficiency record failed validation: {}", outcome.errors.join("; "));
    }
    let normalized = outcome.normalized.expect("ok implies normalized");

    let json = emit_jcs(&normalized).context("canonicalizing sufficiency record")?;
    let hpath = history_path(&normalized.scope, &normalized.knowledge_version, now);
    write_file_atomic(&hpath, &json).with_context(|| format!("writing {hpath}"))?;

    let md = render_markdown(&normalized);
    let hmd = history_md_path(&normalized.scope, &normalized.knowledge_version, now);
    write_file_atomic(&hmd, &md).with_context(|| format!("writing {hmd}"))?;

    let lpath = latest_path(&normalized.scope);
    write_file_atomic(&lpath, &json).with_context(|| format!("writing {lpath}"))?;

    Ok(normalized)
}

/// Read the most-recently-decided record for `scope`, whatever its
/// `knowledge_version`. Callers comparing against a *specific* version must
/// check `record.knowledge_version` themselves (§8 scenario S5: sufficiency
/// does not carry across a version bump).
pub fn read_latest(scope: &Scope) -> Result<Option<SufficiencyRecord>> {
    read_json_opt(&latest_path(scope)).with_context(|| format!("reading latest sufficiency for {scope}"))
}

/// Whether `scope` is recorded `sufficient` for exactly `knowledge_version`.
pub fn is_sufficient_for(scope: &Scope, knowledge_version: &str) -> Result<bool> {
    Ok(read_latest(scope)?.is_some_and(|record| {
        record.status == SufficiencyStatus::Sufficient && record.knowledge_version == knowledge_version
    }))
}

/// `propose(scope, knowledge_version)`: compute the current staleness,
/// coverage, and open-decision picture and record it as `proposed_sufficient`
/// — this never gates, it only reflects reality back for a human/meeting to
/// act on.
pub fn propose(
    scope: &Scope,
    knowledge_version: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<SufficiencyRecord> {
    let staleness = evaluate_scope_staleness(scope, now, registry, git, threshold)?;
    let coverage_ok = coverage_complete(&staleness);
    let open_decisions = list_open_packets_for_scope(scope)?;

    let mut blockers = Vec::new();
    if !coverage_ok {
        blockers.push(Blocker {
            id: "coverage_incomplete".to_string(),
            title: "Scan coverage is incomplete".to_string(),
            details: "one or more repos in scope are missing a repo_index.json or scan.json".to_string(),
        });
    }
    if staleness.hard_stale {
        blockers.push(Blocker {
            id: "hard_stale".to_string(),
            title: "Scope is hard-stale".to_string(),
            details: staleness.reasons.join(", "),
        });
    }
    if !open_decisions.is_empty() {
        blockers.push(Blocker {
            id: "open_decision_packets".to_string(),
            title: "Open decision packets exist for this scope".to_string(),
            details: open_decisions
                .iter()
                .map(|d| d.decision_id.clone())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    blockers.sort_by(|a, b| a.id.cmp(&b.id));

    let record = SufficiencyRecord {
        scope: scope.clone(),
        knowledge_version: knowledge_version.to_string(),
        status: SufficiencyStatus::ProposedSufficient,
        decided_by: None,
        decided_at: None,
        rationale_md_path: None,
        evidence_basis: Vec::new(),
        blockers,
        stale_status: stale_status_for(&staleness),
    };

    persist(&record, now)
}

/// `approve(scope, knowledge_version, decidedBy)`: gates on hard-staleness,
/// incomplete scan coverage, and any open decision packet for `scope`; on
/// success writes `status=sufficient`, `blockers=[]`.
pub fn approve(
    scope: &Scope,
    knowledge_version: &str,
    decided_by: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<GateOutcome> {
    let staleness = evaluate_scope_staleness(scope, now, registry, git, threshold)?;

    if staleness.hard_stale {
        return Ok(GateOutcome::refuse(format!(
            "{scope} is hard-stale ({}); refresh required before approval",
            staleness.reasons.join(", ")
        )));
    }
    if !coverage_complete(&staleness) {
        return Ok(GateOutcome::refuse("scan coverage is incomplete"));
    }
    let open_decisions = list_open_packets_for_scope(scope)?;
    if !open_decisions.is_empty() {
        return Ok(GateOutcome::refuse(format!(
            "{} open decision packet(s) exist for {scope}",
            open_decisions.len()
        )));
    }

    let record = SufficiencyRecord {
        scope: scope.clone(),
        knowledge_version: knowledge_version.to_string(),
        status: SufficiencyStatus::Sufficient,
        decided_by: Some(decided_by.to_string()),
        decided_at: Some(now),
        rationale_md_path: None,
        evidence_basis: Vec::new(),
        blockers: Vec::new(),
        stale_status: stale_status_for(&staleness),
    };

    Ok(GateOutcome::accept(persist(&record, now)?))
}

/// `reject(scope, knowledge_version, rejectedBy, notes)`: always succeeds —
/// resets the scope to `insufficient` with a human-authored blocker.
pub fn reject(
    scope: &Scope,
    knowledge_version: &str,
    rejected_by: &str,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<SufficiencyRecord> {
    let record = SufficiencyRecord {
        scope: scope.clone(),
        knowledge_version: knowledge_version.to_string(),
        status: SufficiencyStatus::Insufficient,
        decided_by: Some(rejected_by.to_string()),
        decided_at: Some(now),
        rationale_md_path: None,
        evidence_basis: Vec::new(),
        blockers: vec![Blocker {
            id: "rejected_by_human".to_string(),
            title: "Rejected by human".to_string(),
            details: format!("{rejected_by}: {notes}"),
        }],
        stale_status: StaleStatus::Fresh,
    };

    persist(&record, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use lanea_git::fake::FakeGit;
    use lanea_utils::paths::{repo_index_path, repo_scan_path, with_isolated_home};
    use lanea_utils::types::{RepoCommands, RepoEntry, RepoIndex, RepoStatus, RepositoryRegistry, ScanRecord};
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

    fn complete_coverage(now: DateTime<Utc>) {
        let idx = RepoIndex {
            scanned_at: now,
            head_sha: "sha1".to_string(),
            cross_repo_dependencies: vec![],
            dependencies: Default::default(),
        };
        let path = repo_index_path("repo-a");
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), serde_json::to_string(&idx).unwrap()).unwrap();

        let scan = ScanRecord {
            scanned_at: now,
            extra: serde_json::Map::new(),
        };
        let path = repo_scan_path("repo-a");
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), serde_json::to_string(&scan).unwrap()).unwrap();
    }

    #[test]
    fn approve_refuses_on_incomplete_coverage_then_succeeds_once_complete() {
        let _home = with_isolated_home();
        let registry = registry();
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let scope = Scope::system();

        let outcome = approve(&scope, "v0", "alice", now, &registry, &git, StalenessThreshold::default()).unwrap();
        assert!(!outcome.ok);
        assert!(outcome.message.unwrap().contains("scan coverage is incomplete"));

        complete_coverage(now);
        git.set_head("/repos/repo-a", "sha1", now);

        let outcome = approve(&scope, "v0", "alice", now, &registry, &git, StalenessThreshold::default()).unwrap();
        assert!(outcome.ok);
        let record = outcome.record.unwrap();
        assert_eq!(record.status, SufficiencyStatus::Sufficient);
        assert!(record.blockers.is_empty());

        assert!(is_sufficient_for(&scope, "v0").unwrap());
    }

    #[test]
    fn sufficiency_does_not_carry_across_knowledge_version() {
        let _home = with_isolated_home();
        let registry = registry();
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let scope = Scope::system();

        complete_coverage(now);
        git.set_head("/repos/repo-a", "sha1", now);

        approve(&scope, "v0", "alice", now, &registry, &git, StalenessThreshold::default())
            .unwrap();

        assert!(is_sufficient_for(&scope, "v0").unwrap());
        assert!(!is_sufficient_for(&scope, "v1").unwrap());
    }

    #[test]
    fn approve_refuses_while_decision_packet_is_open() {
        let _home = with_isolated_home();
        let registry = registry();
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let scope = Scope::system();

        complete_coverage(now);
        git.set_head("/repos/repo-a", "sha1", now);

        lanea_packet::ensure_open_packet(
            "manual-review",
            &scope,
            "meeting_escalation",
            "awaiting_human",
            Default::default(),
            vec![lanea_utils::types::DecisionQuestion {
                id: "q1".to_string(),
                question: "ok?".to_string(),
                expected_answer_type: "choice".to_string(),
                constraints: vec![],
                blocks: vec![],
            }],
            vec![],
            now,
        )
        .unwrap();

        let outcome = approve(&scope, "v0", "alice", now, &registry, &git, StalenessThreshold::default()).unwrap();
        assert!(!outcome.ok);
        assert!(outcome.message.unwrap().contains("open decision packet"));
    }

    #[test]
    fn reject_always_succeeds_and_resets_to_insufficient() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let scope = Scope::repo("repo-a");

        let record = reject(&scope, "v0", "bob", "needs more detail", now).unwrap();
        assert_eq!(record.status, SufficiencyStatus::Insufficient);
        assert_eq!(record.blockers.len(), 1);
        assert_eq!(record.blockers[0].id, "rejected_by_human");
    }

    #[test]
    fn repeated_approve_appends_one_history_entry_each_time() {
        let _home = with_isolated_home();
        let registry = registry();
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        let scope = Scope::system();

        complete_coverage(now);
        git.set_head("/repos/repo-a", "sha1", now);

        approve(&scope, "v0", "alice", now, &registry, &git, StalenessThreshold::default()).unwrap();
        let later = now + chrono::Duration::seconds(1);
        approve(&scope, "v0", "alice", later, &registry, &git, StalenessThreshold::default()).unwrap();

        let history_dir = sufficiency_history_dir();
        let count = std::fs::read_dir(history_dir.as_std_path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".json"))
            .count();
        assert_eq!(count, 2);
    }
}
