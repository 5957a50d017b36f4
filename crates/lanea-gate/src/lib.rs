//! Delivery Gate (§4.11): the read-only sufficiency guard downstream
//! exporters consult before shipping. Pure and side-effect-free except for
//! the optional override-ledger append, which goes through an injected
//! [`LedgerAppend`] rather than a fixed I/O call — the same dependency-
//! injection shape this core uses for `GitSurface`/`LlmOracle`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lanea_git::GitSurface;
use lanea_staleness::{evaluate_scope_staleness, StalenessThreshold};
use lanea_utils::jsonl::append_jsonl_line;
use lanea_utils::paths::ledger_path;
use lanea_utils::types::{RepositoryRegistry, Scope};

/// Which scope's sufficiency record satisfied the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryVia {
    Scope,
    System,
}

/// The override event appended to the ledger when delivery proceeds on a
/// human override rather than a confirmed sufficiency record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SufficiencyOverrideEvent {
    pub event: String,
    pub scope: Scope,
    pub knowledge_version: String,
    pub at: DateTime<Utc>,
}

/// Outcome of `require_confirmed_sufficiency_for_delivery`. A refusal is a
/// structured `ok: false` result, never a raised error (§7 "Gate-refusal").
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryGateOutcome {
    pub ok: bool,
    pub via: Option<DeliveryVia>,
    pub message: Option<String>,
    pub override_event: Option<SufficiencyOverrideEvent>,
}

impl DeliveryGateOutcome {
    fn refuse(message: impl Into<String>) -> Self {
        Self { ok: false, via: None, message: Some(message.into()), override_event: None }
    }

    fn accept(via: DeliveryVia) -> Self {
        Self { ok: true, via: Some(via), message: None, override_event: None }
    }

    fn accept_override(event: SufficiencyOverrideEvent) -> Self {
        Self { ok: true, via: None, message: None, override_event: Some(event) }
    }
}

/// Where a `sufficiency_override` event is recorded. The real ledger writes
/// to `ai/lane_a/ledger.jsonl`; tests can substitute a double that merely
/// counts calls.
pub trait LedgerAppend {
    fn append(&self, event: &SufficiencyOverrideEvent) -> Result<()>;
}

/// The production ledger: appends to the shared append-only JSONL ledger
/// every other component in this core writes its own events to.
pub struct JsonlLedger;

impl LedgerAppend for JsonlLedger {
    fn append(&self, event: &SufficiencyOverrideEvent) -> Result<()> {
        append_jsonl_line(&ledger_path(), event)
    }
}

/// `requireConfirmedSufficiencyForDelivery({ scope, forceOverride, ledgerAppend })`
/// (§4.11):
///
/// 1. Hard-stale scope refuses outright.
/// 2. `(scope, currentVersion)` sufficient: accept, `via: scope`.
/// 3. `scope != system` and `(system, currentVersion)` sufficient: accept,
///    `via: system` (a confirmed system-wide knowledge baseline covers any
///    individual repo).
/// 4. `forceOverride`: append a `sufficiency_override` ledger event and
///    accept with that event attached.
/// 5. Otherwise refuse with a message.
#[allow(clippy::too_many_arguments)]
pub fn require_confirmed_sufficiency_for_delivery(
    scope: &Scope,
    current_version: &str,
    force_override: bool,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
    ledger: &dyn LedgerAppend,
) -> Result<DeliveryGateOutcome> {
    let staleness = evaluate_scope_staleness(scope, now, registry, git, threshold)?;
    if staleness.hard_stale {
        return Ok(DeliveryGateOutcome::refuse(format!(
            "{scope} is hard-stale ({}); delivery refused",
            staleness.reasons.join(", ")
        )));
    }

    if lanea_sufficiency::is_sufficient_for(scope, current_version)? {
        return Ok(DeliveryGateOutcome::accept(DeliveryVia::Scope));
    }

    if !scope.is_system() && lanea_sufficiency::is_sufficient_for(&Scope::system(), current_version)? {
        return Ok(DeliveryGateOutcome::accept(DeliveryVia::System));
    }

    if force_override {
        let event = SufficiencyOverrideEvent {
            event: "sufficiency_override".to_string(),
            scope: scope.clone(),
            knowledge_version: current_version.to_string(),
            at: now,
        };
        ledger.append(&event)?;
        return Ok(DeliveryGateOutcome::accept_override(event));
    }

    Ok(DeliveryGateOutcome::refuse(format!(
        "{scope} (and system fallback) is not sufficient for knowledge version {current_version}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use lanea_git::fake::FakeGit;
    use lanea_utils::paths::{repo_index_path, repo_scan_path, with_isolated_home};
    use lanea_utils::types::{RepoCommands, RepoEntry, RepoIndex, RepoStatus, ScanRecord};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

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
        RepositoryRegistry { base_dir: Utf8PathBuf::from("/repos"), repos }
    }

    fn complete_coverage(now: DateTime<Utc>, git: &FakeGit) {
        git.set_head("/repos/repo-a", "sha-a", now);
        let idx = RepoIndex { scanned_at: now, head_sha: "sha-a".to_string(), cross_repo_dependencies: vec![], dependencies: Default::default() };
        lanea_utils::atomic_write::write_file_atomic(&repo_index_path("repo-a"), &lanea_utils::canonicalization::emit_jcs(&idx).unwrap()).unwrap();
        let scan = ScanRecord { scanned_at: now, extra: serde_json::Map::new() };
        lanea_utils::atomic_write::write_file_atomic(&repo_scan_path("repo-a"), &lanea_utils::canonicalization::emit_jcs(&scan).unwrap()).unwrap();
    }

    #[derive(Default)]
    struct CountingLedger {
        calls: Mutex<Vec<SufficiencyOverrideEvent>>,
    }

    impl LedgerAppend for CountingLedger {
        fn append(&self, event: &SufficiencyOverrideEvent) -> Result<()> {
            self.calls.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn refuses_when_hard_stale() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        let ledger = CountingLedger::default();

        let outcome = require_confirmed_sufficiency_for_delivery(
            &Scope::repo("repo-a"),
            "v1.0.0",
            false,
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
            &ledger,
        )
        .unwrap();

        assert!(!outcome.ok);
        assert!(outcome.message.unwrap().contains("hard-stale"));
    }

    #[test]
    fn accepts_when_scope_itself_sufficient() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        let scope = Scope::repo("repo-a");
        lanea_sufficiency::approve(&scope, "v1.0.0", "alice", now, &registry, &git, StalenessThreshold::default()).unwrap();

        let ledger = CountingLedger::default();
        let outcome = require_confirmed_sufficiency_for_delivery(
            &scope,
            "v1.0.0",
            false,
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
            &ledger,
        )
        .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.via, Some(DeliveryVia::Scope));
    }

    #[test]
    fn accepts_via_system_fallback_when_repo_scope_not_sufficient() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        lanea_sufficiency::approve(&Scope::system(), "v1.0.0", "alice", now, &registry, &git, StalenessThreshold::default()).unwrap();

        let ledger = CountingLedger::default();
        let outcome = require_confirmed_sufficiency_for_delivery(
            &Scope::repo("repo-a"),
            "v1.0.0",
            false,
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
            &ledger,
        )
        .unwrap();

        assert!(outcome.ok);
        assert_eq!(outcome.via, Some(DeliveryVia::System));
    }

    #[test]
    fn force_override_appends_ledger_event_when_nothing_is_sufficient() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);

        let ledger = CountingLedger::default();
        let outcome = require_confirmed_sufficiency_for_delivery(
            &Scope::repo("repo-a"),
            "v1.0.0",
            true,
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
            &ledger,
        )
        .unwrap();

        assert!(outcome.ok);
        assert!(outcome.override_event.is_some());
        assert_eq!(ledger.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn refuses_without_override_when_nothing_is_sufficient() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);

        let ledger = CountingLedger::default();
        let outcome = require_confirmed_sufficiency_for_delivery(
            &Scope::repo("repo-a"),
            "v1.0.0",
            false,
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
            &ledger,
        )
        .unwrap();

        assert!(!outcome.ok);
        assert!(ledger.calls.lock().unwrap().is_empty());
    }
}
