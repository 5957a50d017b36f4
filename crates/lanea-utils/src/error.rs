//! Core error taxonomy shared across the knowledge governance crates.
//!
//! `LaneaError` mirrors the taxonomy in the core spec's error handling design:
//! input-missing, input-invalid, LLM-output-invalid, stale-blocked, gate-refusal
//! and fatal. Components return structured results at their own boundary
//! (gate/sufficiency/committee success values carry their own typed outcome)
//! and convert to `LaneaError` only when a failure is a hard precondition
//! violation rather than an expected, caller-visible outcome.

use thiserror::Error;

/// Top-level error type returned by library operations across the core.
///
/// Expected, caller-recoverable outcomes (stale, gate refusal, invalid LLM
/// output) are represented as typed fields on success values, not as
/// `Err(LaneaError)` — see `spec.md` §6 "Exit semantics for callers". Only
/// hard precondition violations and programming-error invariants propagate
/// through this type.
#[derive(Error, Debug)]
pub enum LaneaError {
    #[error("required input missing: {0}")]
    MissingInput(#[from] MissingInputError),

    #[error("input invalid: {0}")]
    InvalidInput(#[from] InvalidInputError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal invariant violated: {0}")]
    Fatal(String),
}

/// An artifact required by an operation was not found on disk.
///
/// The `remediation` field names the producer/command that would create it,
/// per §7's "surface with a remediation hint naming the command/producer".
#[derive(Error, Debug)]
#[error("missing {kind} at {path}: {remediation}")]
pub struct MissingInputError {
    pub kind: String,
    pub path: String,
    pub remediation: String,
}

impl MissingInputError {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        path: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            remediation: remediation.into(),
        }
    }
}

/// An artifact was present but failed contract validation.
///
/// Carries the first validator error verbatim, per §7.
#[derive(Error, Debug)]
#[error("invalid {kind} at {path}: {first_error}")]
pub struct InvalidInputError {
    pub kind: String,
    pub path: String,
    pub first_error: String,
}

impl InvalidInputError {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        path: impl Into<String>,
        first_error: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
            first_error: first_error.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LaneaError>;
