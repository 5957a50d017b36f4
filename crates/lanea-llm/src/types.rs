//! The LLM oracle contract (spec.md §6): `invoke(messages) -> { content }`.
//!
//! This core treats the model as opaque. It does not own the wire protocol
//! to any provider — the two backends in this crate (`claude_cli`,
//! `anthropic_backend`) are the only two transports the reference platform
//! ships with; a caller may supply any other `LlmOracle` impl (a stub, a
//! third-party backend) without this core knowing the difference.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation, as the oracle contract defines it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Errors an `LlmOracle` implementation may surface. The core does not
/// branch on these beyond logging and propagating — a transport failure of
/// any kind is just "the oracle did not answer".
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm binary not found on PATH")]
    BinaryNotFound,
    #[error("llm invocation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("llm invocation failed: {0}")]
    Transport(String),
    #[error("llm misconfiguration: {0}")]
    Misconfiguration(String),
    #[error("llm output was not valid UTF-8")]
    NonUtf8Output,
}

/// `invoke(messages: [{role, content}]) -> { content }` (spec.md §6). The
/// core calls this at temperature zero and treats the provider as
/// deterministic-enough for its own output-validation purposes; the oracle
/// itself owns whatever retry/timeout policy its transport needs.
pub trait LlmOracle: Send + Sync {
    fn invoke(&self, messages: &[Message]) -> Result<String, LlmError>;
}
