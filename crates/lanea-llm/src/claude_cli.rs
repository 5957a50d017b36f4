//! Claude CLI backend: invokes the `claude` binary as a subprocess, piping
//! the rendered conversation on stdin and reading its full stdout as the
//! oracle's answer. Modeled directly on `lanea-git`'s `SystemGit::run` —
//! argv-only invocation, bounded timeout via polling `try_wait`, stdout/
//! stderr drained on background threads so a large response can't deadlock
//! a full pipe buffer.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::types::{LlmError, LlmOracle, Message, Role};

pub const DEFAULT_CLAUDE_TIMEOUT: Duration = Duration::from_secs(600);

/// Invokes `claude --print` (or an equivalent one-shot mode) with the
/// rendered conversation on stdin.
pub struct ClaudeCliBackend {
    binary: String,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl ClaudeCliBackend {
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            extra_args: vec!["--print".to_string()],
            timeout: DEFAULT_CLAUDE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

fn render_conversation(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let tag = match message.role {
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        };
        out.push_str(&format!("<<<{tag}>>>\n{}\n", message.content));
    }
    out
}

impl LlmOracle for ClaudeCliBackend {
    fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        if which::which(&self.binary).is_err() {
            return Err(LlmError::BinaryNotFound);
        }

        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let span = tracing::debug_span!("claude_cli_invoke", binary = %self.binary);
        let _enter = span.enter();

        let mut child = cmd.spawn().map_err(|e| LlmError::Transport(e.to_string()))?;

        let mut stdin = child.stdin.take().expect("stdin piped");
        let input = render_conversation(messages);
        std::thread::spawn(move || {
            let _ = stdin.write_all(input.as_bytes());
        });

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
            match child.try_wait().map_err(|e| LlmError::Transport(e.to_string()))? {
                Some(status) => break status,
                None => {
                    if start.elapsed() >= self.timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(LlmError::Timeout(self.timeout));
                    }
                    std::thread::sleep(Duration::from_millis(20));
                }
            }
        };

        let stdout_buf = stdout_handle.join().unwrap_or_default();
        let stderr_buf = stderr_handle.join().unwrap_or_default();

        if !status.success() {
            return Err(LlmError::Transport(String::from_utf8_lossy(&stderr_buf).into_owned()));
        }

        String::from_utf8(stdout_buf).map_err(|_| LlmError::NonUtf8Output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_conversation_tags_each_role() {
        let messages = vec![Message::system("be terse"), Message::user("hello")];
        let rendered = render_conversation(&messages);
        assert!(rendered.contains("<<<SYSTEM>>>\nbe terse"));
        assert!(rendered.contains("<<<USER>>>\nhello"));
    }

    #[test]
    fn unknown_binary_is_reported_as_not_found() {
        let backend = ClaudeCliBackend::new("lanea-llm-definitely-not-a-real-binary");
        let err = backend.invoke(&[Message::user("hi")]).unwrap_err();
        assert!(matches!(err, LlmError::BinaryNotFound));
    }
}
