//! Evidence Catalog (§4.4): load a repo's pinned evidence references, sort
//! them canonically, and resolve them against the live repository into
//! byte-exact excerpts a committee role can cite.

use anyhow::{bail, Context, Result};

use lanea_git::GitSurface;
use lanea_utils::jsonl::read_jsonl;
use lanea_utils::paths::evidence_refs_path;
use lanea_utils::types::{EvidenceReference, RepositoryRegistry};
use lanea_validation::validate_evidence_set;

/// One evidence reference resolved into its cited source excerpt.
/// Named and shaped after the selection-candidate pattern used for packet
/// building elsewhere in this workspace, minus the priority/budget
/// concerns that don't apply to a fixed, pre-pinned reference set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceBundleEntry {
    pub evidence_id: String,
    pub file_path: camino::Utf8PathBuf,
    pub commit_sha: String,
    pub start_line: u32,
    pub end_line: u32,
    pub excerpt: String,
}

/// Load a repo's `evidence_refs.jsonl`, validate it, and return the
/// entries sorted by `file_path`. An invalid or unreadable file is an
/// error, not an empty catalog (§4.2).
pub fn load_evidence_refs(repo_id: &str) -> Result<Vec<EvidenceReference>> {
    let path = evidence_refs_path(repo_id);
    let raw: Vec<EvidenceReference> =
        read_jsonl(&path).with_context(|| format!("reading evidence refs at {path}"))?;
    let outcome = validate_evidence_set(raw);
    if !outcome.ok {
        bail!(
            "evidence_refs.jsonl for {repo_id} failed validation: {}",
            outcome.errors.join("; ")
        );
    }
    Ok(outcome.normalized.expect("ok implies normalized"))
}

/// `buildEvidenceBundle(refs)`: resolve each reference's inclusive line
/// slice of `git show <commit_sha>:<file_path>`, trailing-trimmed but
/// otherwise byte-exact. A single `git show` failure is a hard error — the
/// catalog never returns a partial bundle.
pub fn build_evidence_bundle(
    refs: &[EvidenceReference],
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
) -> Result<Vec<EvidenceBundleEntry>> {
    let mut bundle = Vec::with_capacity(refs.len());
    for r in refs {
        let repo_path = registry
            .resolve_repo_path(&r.repo_id)
            .with_context(|| format!("{}: repo {} not found in registry", r.evidence_id, r.repo_id))?;

        let content = git
            .show_file(&repo_path, &r.commit_sha, &r.file_path)
            .with_context(|| {
                format!(
                    "{}: git show {}:{} failed",
                    r.evidence_id, r.commit_sha, r.file_path
                )
            })?;

        let excerpt = slice_lines(&content, r.start_line, r.end_line);

        bundle.push(EvidenceBundleEntry {
            evidence_id: r.evidence_id.clone(),
            file_path: r.file_path.clone(),
            commit_sha: r.commit_sha.clone(),
            start_line: r.start_line,
            end_line: r.end_line,
            excerpt,
        });
    }
    Ok(bundle)
}

/// Extract the inclusive 1-indexed `[start_line, end_line]` slice of
/// `content`, joined with `\n` and trailing-trimmed. Out-of-range bounds
/// clamp to the available lines rather than panicking.
fn slice_lines(content: &str, start_line: u32, end_line: u32) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() || start_line == 0 {
        return String::new();
    }
    let start = (start_line - 1) as usize;
    let end = (end_line as usize).min(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use lanea_git::fake::FakeGit;
    use lanea_utils::jsonl::append_jsonl_line;
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

    fn evidence_ref(id: &str, path: &str, start: u32, end: u32) -> EvidenceReference {
        EvidenceReference {
            evidence_id: id.to_string(),
            repo_id: "repo-a".to_string(),
            commit_sha: "sha1".to_string(),
            file_path: camino::Utf8PathBuf::from(path),
            start_line: start,
            end_line: end,
        }
    }

    #[test]
    fn load_evidence_refs_sorts_by_file_path() {
        let _home = with_isolated_home();
        let path = evidence_refs_path("repo-a");
        append_jsonl_line(&path, &evidence_ref("e2", "z.rs", 1, 2)).unwrap();
        append_jsonl_line(&path, &evidence_ref("e1", "a.rs", 1, 2)).unwrap();

        let refs = load_evidence_refs("repo-a").unwrap();
        assert_eq!(refs[0].file_path.as_str(), "a.rs");
    }

    #[test]
    fn build_bundle_slices_inclusive_and_trims_trailing() {
        let git = FakeGit::new();
        git.set_file(
            "/repos/repo-a",
            "sha1",
            "src/lib.rs",
            "line1\nline2\nline3\nline4\n",
        );
        let refs = vec![evidence_ref("e1", "src/lib.rs", 2, 3)];
        let bundle = build_evidence_bundle(&refs, &registry(), &git).unwrap();
        assert_eq!(bundle[0].excerpt, "line2\nline3");
    }

    #[test]
    fn git_show_failure_is_hard_error_not_partial_bundle() {
        let git = FakeGit::new();
        let refs = vec![
            evidence_ref("e1", "src/lib.rs", 1, 1),
            evidence_ref("e2", "src/missing.rs", 1, 1),
        ];
        git.set_file("/repos/repo-a", "sha1", "src/lib.rs", "present\n");
        let result = build_evidence_bundle(&refs, &registry(), &git);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_repo_in_registry_is_hard_error() {
        let git = FakeGit::new();
        let mut r = evidence_ref("e1", "src/lib.rs", 1, 1);
        r.repo_id = "unknown-repo".to_string();
        let result = build_evidence_bundle(&[r], &registry(), &git);
        assert!(result.is_err());
    }
}
