//! `evaluateRepoStaleness` / `evaluateScopeStaleness` (§4.3).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use lanea_git::GitSurface;
use lanea_utils::jsonl::read_json_opt;
use lanea_utils::paths;
use lanea_utils::types::{RepoIndex, RepositoryRegistry, ScanRecord, Scope, StalenessSnapshot};

use crate::events::latest_merge_event_time_for_repo;
use crate::threshold::StalenessThreshold;

/// Read an optional JSON artifact, collapsing a parse failure into "absent"
/// for staleness purposes — an unreadable `repo_index.json`/`scan.json`
/// contributes `coverage_incomplete` exactly like a missing one, it just
/// also gets logged so the distinction isn't silently lost.
fn read_optional_artifact<T: serde::de::DeserializeOwned>(
    path: &camino::Utf8Path,
    kind: &str,
) -> Option<T> {
    match read_json_opt::<T>(path) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path, kind, error = %err, "artifact present but unreadable; treating as absent for coverage");
            None
        }
    }
}

/// Evaluate staleness for a single repository (§4.3 `evaluateRepoStaleness`).
pub fn evaluate_repo_staleness(
    repo_id: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<StalenessSnapshot> {
    // Step 1-2: resolve path, read HEAD; a missing repo or a `git` failure
    // both collapse to `repo_head_sha = None` and processing continues
    // (missing HEAD must never by itself imply staleness).
    let repo_head_sha = registry
        .resolve_repo_path(repo_id)
        .and_then(|path| git.rev_parse_head(&path).ok());

    // Step 3.
    let repo_index: Option<RepoIndex> =
        read_optional_artifact(&paths::repo_index_path(repo_id), "repo_index");
    let scan: Option<ScanRecord> = read_optional_artifact(&paths::repo_scan_path(repo_id), "scan");

    let last_scanned_head_sha = repo_index.as_ref().map(|idx| idx.head_sha.clone());
    let last_scan_time = scan
        .as_ref()
        .map(|s| s.scanned_at)
        .or_else(|| repo_index.as_ref().map(|idx| idx.scanned_at));

    // Step 4.
    let last_merge_event_time = latest_merge_event_time_for_repo(&paths::event_segments_dir(), repo_id)
        .with_context(|| format!("scanning event segments for {repo_id}"))?;

    // Step 5.
    let coverage_complete = repo_index.is_some() && scan.is_some();

    // Step 6.
    let mut reasons = Vec::new();
    if !coverage_complete {
        reasons.push("coverage_incomplete".to_string());
    }
    let head_sha_mismatch = match (&repo_head_sha, &last_scanned_head_sha) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    };
    if head_sha_mismatch {
        reasons.push("head_sha_mismatch".to_string());
    }
    let merge_event_after_scan = match (last_merge_event_time, last_scan_time) {
        (Some(merge), Some(scan_time)) => merge > scan_time,
        _ => false,
    };
    if merge_event_after_scan {
        reasons.push("merge_event_after_scan".to_string());
    }
    reasons.sort();
    reasons.dedup();

    // Step 7.
    let stale = !reasons.is_empty();

    // Step 8.
    let scan_age_over_threshold = last_scan_time.is_some_and(|scan_time| {
        now.signed_duration_since(scan_time)
            > chrono::Duration::from_std(threshold.as_duration()).expect("bounded threshold fits")
    });
    let hard_stale = stale && (merge_event_after_scan || scan_age_over_threshold);

    Ok(StalenessSnapshot {
        scope: Scope::repo(repo_id),
        stale,
        hard_stale,
        reasons,
        stale_repos: if stale { vec![repo_id.to_string()] } else { vec![] },
        hard_stale_repos: if hard_stale {
            vec![repo_id.to_string()]
        } else {
            vec![]
        },
        repo_id: Some(repo_id.to_string()),
        repo_head_sha,
        last_scanned_head_sha,
        last_scan_time,
        last_merge_event_time,
    })
}

/// Evaluate staleness for a scope (§4.3 `evaluateScopeStaleness`): `system`
/// aggregates across every active repo, `repo:<id>` delegates directly.
pub fn evaluate_scope_staleness(
    scope: &Scope,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<StalenessSnapshot> {
    if let Some(repo_id) = scope.repo_id() {
        return evaluate_repo_staleness(repo_id, now, registry, git, threshold);
    }

    let mut reasons = Vec::new();
    let mut stale_repos = Vec::new();
    let mut hard_stale_repos = Vec::new();
    let mut stale = false;
    let mut hard_stale = false;

    for repo_id in registry.active_repo_ids() {
        let snapshot = evaluate_repo_staleness(repo_id, now, registry, git, threshold)?;
        stale |= snapshot.stale;
        hard_stale |= snapshot.hard_stale;
        reasons.extend(snapshot.reasons);
        stale_repos.extend(snapshot.stale_repos);
        hard_stale_repos.extend(snapshot.hard_stale_repos);
    }

    reasons.sort();
    reasons.dedup();
    stale_repos.sort();
    stale_repos.dedup();
    hard_stale_repos.sort();
    hard_stale_repos.dedup();

    Ok(StalenessSnapshot {
        scope: Scope::system(),
        stale,
        hard_stale,
        reasons,
        stale_repos,
        hard_stale_repos,
        repo_id: None,
        repo_head_sha: None,
        last_scanned_head_sha: None,
        last_scan_time: None,
        last_merge_event_time: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use lanea_git::fake::FakeGit;
    use lanea_utils::jsonl::append_jsonl_line;
    use lanea_utils::paths::with_isolated_home;
    use lanea_utils::types::{RepoCommands, RepoEntry, RepoStatus};
    use std::collections::BTreeMap;

    fn registry_with(repo_id: &str) -> RepositoryRegistry {
        let mut repos = BTreeMap::new();
        repos.insert(
            repo_id.to_string(),
            RepoEntry {
                path: Utf8PathBuf::from(repo_id),
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

    fn write_repo_index(repo_id: &str, head_sha: &str, scanned_at: DateTime<Utc>) {
        let idx = RepoIndex {
            scanned_at,
            head_sha: head_sha.to_string(),
            cross_repo_dependencies: vec![],
            dependencies: Default::default(),
        };
        let path = paths::repo_index_path(repo_id);
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), serde_json::to_string(&idx).unwrap()).unwrap();
    }

    fn write_scan(repo_id: &str, scanned_at: DateTime<Utc>) {
        let scan = ScanRecord {
            scanned_at,
            extra: serde_json::Map::new(),
        };
        let path = paths::repo_scan_path(repo_id);
        std::fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
        std::fs::write(path.as_std_path(), serde_json::to_string(&scan).unwrap()).unwrap();
    }

    #[test]
    fn missing_coverage_is_stale_but_not_hard_stale() {
        let _home = with_isolated_home();
        let registry = registry_with("repo-a");
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();

        let snapshot =
            evaluate_repo_staleness("repo-a", now, &registry, &git, StalenessThreshold::default())
                .unwrap();

        assert!(snapshot.stale);
        assert!(!snapshot.hard_stale);
        assert!(snapshot.reasons.contains(&"coverage_incomplete".to_string()));
    }

    #[test]
    fn missing_head_alone_is_not_stale() {
        let _home = with_isolated_home();
        let registry = registry_with("repo-a");
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();

        write_repo_index("repo-a", "abc123", now - chrono::Duration::minutes(5));
        write_scan("repo-a", now - chrono::Duration::minutes(5));

        let snapshot =
            evaluate_repo_staleness("repo-a", now, &registry, &git, StalenessThreshold::default())
                .unwrap();

        assert!(!snapshot.stale);
        assert!(snapshot.repo_head_sha.is_none());
    }

    #[test]
    fn head_sha_mismatch_is_stale_not_hard_stale_within_threshold() {
        let _home = with_isolated_home();
        let registry = registry_with("repo-a");
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        git.set_head("/repos/repo-a", "new-sha", now);

        write_repo_index("repo-a", "old-sha", now - chrono::Duration::minutes(5));
        write_scan("repo-a", now - chrono::Duration::minutes(5));

        let snapshot =
            evaluate_repo_staleness("repo-a", now, &registry, &git, StalenessThreshold::default())
                .unwrap();

        assert!(snapshot.stale);
        assert!(!snapshot.hard_stale);
        assert!(snapshot.reasons.contains(&"head_sha_mismatch".to_string()));
    }

    #[test]
    fn merge_event_after_scan_is_hard_stale() {
        let _home = with_isolated_home();
        let registry = registry_with("repo-a");
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        git.set_head("/repos/repo-a", "sha1", now);

        let scan_time = now - chrono::Duration::minutes(10);
        write_repo_index("repo-a", "sha1", scan_time);
        write_scan("repo-a", scan_time);

        let segments_dir = paths::event_segments_dir();
        std::fs::create_dir_all(segments_dir.as_std_path()).unwrap();
        append_jsonl_line(
            &segments_dir.join("events-20260727-00.jsonl"),
            &crate::events::SegmentEvent {
                event_type: "merge".to_string(),
                scope: None,
                repo_id: Some("repo-a".to_string()),
                timestamp: scan_time + chrono::Duration::hours(1),
                event_id: Some("e1".to_string()),
                extra: serde_json::Map::new(),
            },
        )
        .unwrap();

        let snapshot =
            evaluate_repo_staleness("repo-a", now, &registry, &git, StalenessThreshold::default())
                .unwrap();

        assert!(snapshot.stale);
        assert!(snapshot.hard_stale);
        assert!(snapshot.reasons.contains(&"merge_event_after_scan".to_string()));
    }

    #[test]
    fn scan_age_over_threshold_is_hard_stale() {
        let _home = with_isolated_home();
        let registry = registry_with("repo-a");
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
        git.set_head("/repos/repo-a", "new-sha", now);

        // head_sha_mismatch makes it stale; scan age alone pushes it hard.
        write_repo_index("repo-a", "old-sha", now - chrono::Duration::minutes(31));
        write_scan("repo-a", now - chrono::Duration::minutes(31));

        let snapshot =
            evaluate_repo_staleness("repo-a", now, &registry, &git, StalenessThreshold::default())
                .unwrap();

        assert!(snapshot.hard_stale);
    }

    #[test]
    fn system_scope_aggregates_across_active_repos() {
        let _home = with_isolated_home();
        let mut registry = registry_with("repo-a");
        registry.repos.insert(
            "repo-b".to_string(),
            registry.repos.get("repo-a").unwrap().clone(),
        );
        let git = FakeGit::new();
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();

        // repo-a: fully fresh. repo-b: missing coverage -> stale.
        write_repo_index("repo-a", "sha1", now - chrono::Duration::minutes(5));
        write_scan("repo-a", now - chrono::Duration::minutes(5));
        git.set_head("/repos/repo-a", "sha1", now);

        let snapshot = evaluate_scope_staleness(
            &Scope::system(),
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
        )
        .unwrap();

        assert!(snapshot.stale);
        assert_eq!(snapshot.stale_repos, vec!["repo-b".to_string()]);
    }
}
