//! Loads and validates the Repository Registry (`config/REPOS.json`).

use camino::Utf8Path;

use lanea_utils::error::{InvalidInputError, MissingInputError, Result};
use lanea_utils::paths::repos_registry_path;
use lanea_utils::types::RepositoryRegistry;
use lanea_validation::Validate;

/// Read `config/REPOS.json` and return a validated registry. An unreadable
/// file is §7 Input-missing; a present-but-malformed one is §7
/// Input-invalid — there is no such thing as an empty registry standing in
/// for a missing one.
pub fn load_repository_registry() -> Result<RepositoryRegistry> {
    load_repository_registry_from(&repos_registry_path())
}

/// Path-driven variant used by tests and by callers that already know
/// where the registry lives (e.g. a CLI `--repos-file` override).
pub fn load_repository_registry_from(path: &Utf8Path) -> Result<RepositoryRegistry> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        MissingInputError::new("repository_registry", path.to_string(), format!("create it: {e}"))
    })?;
    let registry: RepositoryRegistry = serde_json::from_str(&raw).map_err(|e| {
        InvalidInputError::new("repository_registry", path.to_string(), e.to_string())
    })?;

    let outcome = registry.validate();
    if !outcome.ok {
        return Err(InvalidInputError::new(
            "repository_registry",
            path.to_string(),
            outcome.errors.join("; "),
        )
        .into());
    }
    Ok(outcome.normalized.expect("ok implies normalized"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn write_registry(dir: &Utf8Path, body: &str) -> Utf8PathBuf {
        let path = dir.join("REPOS.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_a_well_formed_registry() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let path = write_registry(
            dir,
            r#"{
                "base_dir": "/repos",
                "repos": {
                    "repo-a": {
                        "path": "repo-a",
                        "active_branch": "main",
                        "team_id": "team-a",
                        "kind": "service",
                        "status": "active",
                        "commands": { "cwd": ".", "package_manager": "cargo" }
                    }
                }
            }"#,
        );
        let registry = load_repository_registry_from(&path).unwrap();
        assert_eq!(registry.active_repo_ids(), vec!["repo-a".to_string()]);
    }

    #[test]
    fn rejects_an_empty_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let path = write_registry(
            dir,
            r#"{
                "base_dir": "",
                "repos": {}
            }"#,
        );
        assert!(load_repository_registry_from(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let result = load_repository_registry_from(&dir.join("missing.json"));
        assert!(result.is_err());
    }
}
