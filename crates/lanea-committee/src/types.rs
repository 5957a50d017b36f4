//! Shared types for the committee pipeline: run modes, the structured
//! outcome a caller sees, and the per-run state machine (§4.5).

use lanea_utils::types::{CommitteeStatus, IntegrationStatus};

/// Which role a single LLM invocation plays. `Architect`/`Skeptic` run in
/// sequence for a `repo:<id>` scope; `IntegrationChair` runs once across the
/// whole registry; `QaStrategist` is the third, single-role mode §4.5 names
/// but does not otherwise specify — it gets a findings artifact but no
/// derived status (see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitteeRole {
    Architect,
    Skeptic,
    IntegrationChair,
    QaStrategist,
}

impl CommitteeRole {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Architect => "architect",
            Self::Skeptic => "skeptic",
            Self::IntegrationChair => "integration_chair",
            Self::QaStrategist => "qa_strategist",
        }
    }
}

/// Terminal states of a single committee run (§4.5 "state machine per repo
/// committee run"). `Pending`/`Running` are transient and never observed by
/// a caller — `run_repo_committee` only returns once a terminal state is
/// reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    MissingInput,
    StaleBlocked,
    LlmError,
    OutputInvalid,
    EvidenceValid,
    EvidenceInvalid,
}

impl RunState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::StaleBlocked => "stale_blocked",
            Self::LlmError => "llm_error",
            Self::OutputInvalid => "output_invalid",
            Self::EvidenceValid => "evidence_valid",
            Self::EvidenceInvalid => "evidence_invalid",
        }
    }
}

/// The structured result of one repo committee run. Never an `Err` for an
/// expected outcome (stale-blocked, invalid output) — those are all
/// represented here, per §7.
#[derive(Debug, Clone)]
pub struct RepoCommitteeOutcome {
    pub repo_id: String,
    pub state: RunState,
    pub ok: bool,
    pub reason_code: Option<String>,
    pub message: Option<String>,
    pub status: Option<CommitteeStatus>,
}

/// The structured result of an integration-chair run.
#[derive(Debug, Clone)]
pub struct IntegrationCommitteeOutcome {
    pub state: RunState,
    pub ok: bool,
    pub reason_code: Option<String>,
    pub message: Option<String>,
    pub status: Option<IntegrationStatus>,
}

/// The structured result of a qa-strategist run. No derived status exists
/// for this mode (§4.5 names it but specifies no derivation rule); callers
/// get the raw verdict off the persisted `CommitteeOutput`.
#[derive(Debug, Clone)]
pub struct QaStrategistOutcome {
    pub state: RunState,
    pub ok: bool,
    pub reason_code: Option<String>,
    pub message: Option<String>,
    pub evidence_valid: Option<bool>,
}
