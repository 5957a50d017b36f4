//! The read-only git command surface this core consumes (`spec.md` §6):
//! `rev-parse HEAD`, `show -s --format=%cI HEAD`, `show <ref>:<path>`,
//! `remote get-url origin`. Ancillary flows (`worktree`, `apply`, `grep`)
//! belong to the patch-planning lane this core doesn't own (§1 Non-goals)
//! and are not implemented here.
//!
//! Invocations are argv-style only (`Command::new("git").args([...])`, never
//! a shell string) and carry a default 30s timeout; a timeout is treated as
//! a failure, never retried (§5 "Cancellation and timeouts").

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git binary not found on PATH")]
    BinaryNotFound,
    #[error("git command timed out after {0:?}")]
    Timeout(Duration),
    #[error("git command failed (exit {exit_code:?}): {stderr}")]
    CommandFailed {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("git output was not valid UTF-8")]
    NonUtf8Output,
    #[error("failed to spawn git: {0}")]
    Spawn(std::io::Error),
}

/// The surface this core actually calls. A trait so committee/staleness/
/// evidence code can be tested against a fake without invoking real git.
pub trait GitSurface: Send + Sync {
    /// `git rev-parse HEAD` in `repo_path`. May fail silently per §4.3 step 2
    /// — callers map `Err` to `repo_head_sha = None`, never to staleness.
    fn rev_parse_head(&self, repo_path: &Utf8Path) -> Result<String, GitError>;

    /// `git show -s --format=%cI HEAD` — the commit time of HEAD.
    fn head_commit_time(&self, repo_path: &Utf8Path) -> Result<DateTime<Utc>, GitError>;

    /// `git show <commit_sha>:<file_path>`, byte-exact (trailing-trimmed by
    /// the caller, not here — see `lanea-evidence`).
    fn show_file(
        &self,
        repo_path: &Utf8Path,
        commit_sha: &str,
        file_path: &Utf8Path,
    ) -> Result<String, GitError>;

    /// `git remote get-url origin`.
    fn remote_origin_url(&self, repo_path: &Utf8Path) -> Result<String, GitError>;
}

/// Invokes the real `git` binary with a bounded timeout.
pub struct SystemGit {
    timeout: Duration,
}

impl SystemGit {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_GIT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn run(&self, repo_path: &Utf8Path, args: &[&str]) -> Result<String, GitError> {
        if which::which("git").is_err() {
            return Err(GitError::BinaryNotFound);
        }

        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(repo_path.as_std_path())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let span = tracing::debug_span!("git_command", args = ?args, repo = %repo_path);
        let _enter = span.enter();

        let mut child = cmd.spawn().map_err(GitError::Spawn)?;
        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");

        let stdout_handle = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });
        let stderr_handle = std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf);
            buf
        });

        let start = Instant::now();
        let status = loop {
            match child.try_wait().map_err(GitError::Spawn)? {
                Some(status) => break status,
                None => {
                    if start.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(GitError::Timeout(self.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        };

        let stdout_buf = stdout_handle.join().unwrap_or_default();
        let stderr_buf = stderr_handle.join().unwrap_or_default();

        if !status.success() {
            return Err(GitError::CommandFailed {
                exit_code: status.code(),
                stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            });
        }

        String::from_utf8(stdout_buf).map_err(|_| GitError::NonUtf8Output)
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitSurface for SystemGit {
    fn rev_parse_head(&self, repo_path: &Utf8Path) -> Result<String, GitError> {
        self.run(repo_path, &["rev-parse", "HEAD"])
            .map(|s| s.trim().to_string())
    }

    fn head_commit_time(&self, repo_path: &Utf8Path) -> Result<DateTime<Utc>, GitError> {
        let raw = self.run(repo_path, &["show", "-s", "--format=%cI", "HEAD"])?;
        let trimmed = raw.trim();
        DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| GitError::CommandFailed {
                exit_code: None,
                stderr: format!("unparseable commit time: {trimmed}"),
            })
    }

    fn show_file(
        &self,
        repo_path: &Utf8Path,
        commit_sha: &str,
        file_path: &Utf8Path,
    ) -> Result<String, GitError> {
        let spec = format!("{commit_sha}:{file_path}");
        self.run(repo_path, &["show", &spec])
    }

    fn remote_origin_url(&self, repo_path: &Utf8Path) -> Result<String, GitError> {
        self.run(repo_path, &["remote", "get-url", "origin"])
            .map(|s| s.trim().to_string())
    }
}

/// In-memory fake used by the rest of the workspace's test suites.
#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    use super::{DateTime, GitError, GitSurface, Utc};
    use camino::Utf8Path;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeGit {
        pub heads: Mutex<HashMap<String, String>>,
        pub commit_times: Mutex<HashMap<String, DateTime<Utc>>>,
        pub files: Mutex<HashMap<(String, String, String), String>>,
        pub remotes: Mutex<HashMap<String, String>>,
        pub fail_heads: Mutex<std::collections::HashSet<String>>,
    }

    impl FakeGit {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_head(&self, repo_path: &str, sha: &str, commit_time: DateTime<Utc>) {
            self.heads
                .lock()
                .unwrap()
                .insert(repo_path.to_string(), sha.to_string());
            self.commit_times
                .lock()
                .unwrap()
                .insert(repo_path.to_string(), commit_time);
        }

        pub fn set_file(&self, repo_path: &str, commit_sha: &str, file_path: &str, content: &str) {
            self.files.lock().unwrap().insert(
                (repo_path.to_string(), commit_sha.to_string(), file_path.to_string()),
                content.to_string(),
            );
        }

        pub fn fail_head(&self, repo_path: &str) {
            self.fail_heads.lock().unwrap().insert(repo_path.to_string());
        }
    }

    impl GitSurface for FakeGit {
        fn rev_parse_head(&self, repo_path: &Utf8Path) -> Result<String, GitError> {
            let key = repo_path.as_str();
            if self.fail_heads.lock().unwrap().contains(key) {
                return Err(GitError::CommandFailed {
                    exit_code: Some(128),
                    stderr: "not a git repository".to_string(),
                });
            }
            self.heads
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| GitError::CommandFailed {
                    exit_code: Some(128),
                    stderr: "no head configured".to_string(),
                })
        }

        fn head_commit_time(&self, repo_path: &Utf8Path) -> Result<DateTime<Utc>, GitError> {
            self.commit_times
                .lock()
                .unwrap()
                .get(repo_path.as_str())
                .copied()
                .ok_or_else(|| GitError::CommandFailed {
                    exit_code: Some(128),
                    stderr: "no head configured".to_string(),
                })
        }

        fn show_file(
            &self,
            repo_path: &Utf8Path,
            commit_sha: &str,
            file_path: &Utf8Path,
        ) -> Result<String, GitError> {
            self.files
                .lock()
                .unwrap()
                .get(&(
                    repo_path.as_str().to_string(),
                    commit_sha.to_string(),
                    file_path.as_str().to_string(),
                ))
                .cloned()
                .ok_or_else(|| GitError::CommandFailed {
                    exit_code: Some(128),
                    stderr: format!("no such path {commit_sha}:{file_path}"),
                })
        }

        fn remote_origin_url(&self, repo_path: &Utf8Path) -> Result<String, GitError> {
            self.remotes
                .lock()
                .unwrap()
                .get(repo_path.as_str())
                .cloned()
                .ok_or_else(|| GitError::CommandFailed {
                    exit_code: Some(128),
                    stderr: "no remote configured".to_string(),
                })
        }
    }
}
