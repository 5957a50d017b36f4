//! Exit code constants and outcome-kind mapping for the `lanea` binary.
//!
//! Codes mirror the error taxonomy in spec.md §7: each bucket a completed
//! (non-`Err`) operation can land in gets its own code, distinct from the
//! generic failure code a raised `Err` maps to.

use std::process::ExitCode;

pub mod codes {
    /// Success - operation completed and, where applicable, gated through.
    pub const SUCCESS: u8 = 0;

    /// CLI arguments error - invalid or missing command-line arguments.
    pub const CLI_ARGS: u8 = 2;

    /// Input-missing (§7 `missing_*`) - required artifact absent.
    pub const MISSING_INPUT: u8 = 10;

    /// Input-invalid (§7 `invalid_*`) - artifact present but failed validation.
    pub const INVALID_INPUT: u8 = 11;

    /// LLM-output-invalid (§7) - parse/schema failure or unknown evidence_ref.
    pub const LLM_OUTPUT_INVALID: u8 = 12;

    /// Stale-blocked (§7) - hard-stale refusal.
    pub const STALE_BLOCKED: u8 = 13;

    /// Gate-refusal (§7) - sufficiency/phase/meeting `ok: false`.
    pub const GATE_REFUSAL: u8 = 14;

    /// Fatal (§7) - an error propagated out of the core rather than being
    /// represented as a structured result.
    pub const FATAL: u8 = 70;
}

/// Which §7 taxonomy bucket a completed invocation landed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// A command-line argument failed our own validation (clap itself
    /// already exits 2 directly for parse errors it catches; this covers
    /// the argument shapes clap's derive can't express, like `--scope`).
    CliArgs,
    MissingInput,
    InvalidInput,
    LlmOutputInvalid,
    StaleBlocked,
    GateRefusal,
    /// A transport-layer fault talking to the LLM oracle.
    LlmTransportError,
    /// Any other error that reached `run()` without a more specific
    /// bucket — an internal invariant violation, not a user-recoverable
    /// state.
    Fatal,
}

impl Outcome {
    #[must_use]
    pub fn code_value(self) -> u8 {
        match self {
            Outcome::Success => codes::SUCCESS,
            Outcome::CliArgs => codes::CLI_ARGS,
            Outcome::MissingInput => codes::MISSING_INPUT,
            Outcome::InvalidInput => codes::INVALID_INPUT,
            Outcome::LlmOutputInvalid => codes::LLM_OUTPUT_INVALID,
            Outcome::StaleBlocked => codes::STALE_BLOCKED,
            Outcome::GateRefusal => codes::GATE_REFUSAL,
            Outcome::LlmTransportError | Outcome::Fatal => codes::FATAL,
        }
    }

    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.code_value())
    }
}

/// Map a committee run's [`lanea_committee::RunState`] onto an [`Outcome`].
#[must_use]
pub fn from_run_state(state: lanea_committee::RunState) -> Outcome {
    use lanea_committee::RunState;
    match state {
        RunState::EvidenceValid => Outcome::Success,
        RunState::MissingInput => Outcome::MissingInput,
        RunState::StaleBlocked => Outcome::StaleBlocked,
        RunState::OutputInvalid | RunState::EvidenceInvalid => Outcome::LlmOutputInvalid,
        RunState::LlmError => Outcome::LlmTransportError,
    }
}

/// Classify an `Err` that reached `run()` by walking its source chain for a
/// [`lanea_utils::error::LaneaError`] or a CLI argument-validation marker,
/// so that a missing/malformed `config/REPOS.json` (§7 Input-missing)
/// doesn't get lumped in with a genuine internal invariant violation.
#[must_use]
pub fn classify_err(err: &anyhow::Error) -> Outcome {
    if err.downcast_ref::<crate::CliArgError>().is_some() {
        return Outcome::CliArgs;
    }
    match err.downcast_ref::<lanea_utils::error::LaneaError>() {
        Some(lanea_utils::error::LaneaError::MissingInput(_)) => Outcome::MissingInput,
        Some(lanea_utils::error::LaneaError::InvalidInput(_)) => Outcome::InvalidInput,
        _ => Outcome::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_valid_maps_to_success() {
        assert_eq!(from_run_state(lanea_committee::RunState::EvidenceValid), Outcome::Success);
    }

    #[test]
    fn stale_blocked_maps_to_stale_blocked_code() {
        assert_eq!(Outcome::StaleBlocked.code_value(), codes::STALE_BLOCKED);
    }

    #[test]
    fn missing_input_maps_to_missing_input_code() {
        assert_eq!(from_run_state(lanea_committee::RunState::MissingInput), Outcome::MissingInput);
        assert_eq!(Outcome::MissingInput.code_value(), codes::MISSING_INPUT);
    }

    #[test]
    fn output_invalid_and_evidence_invalid_share_a_code() {
        assert_eq!(
            from_run_state(lanea_committee::RunState::OutputInvalid),
            from_run_state(lanea_committee::RunState::EvidenceInvalid)
        );
    }

    #[test]
    fn llm_error_maps_to_fatal_code() {
        assert_eq!(from_run_state(lanea_committee::RunState::LlmError).code_value(), codes::FATAL);
    }

    #[test]
    fn cli_arg_error_classifies_as_cli_args() {
        let err = anyhow::Error::new(crate::CliArgError("bad scope".to_string()));
        assert_eq!(classify_err(&err).code_value(), codes::CLI_ARGS);
    }

    #[test]
    fn missing_input_error_classifies_as_missing_input_even_with_context() {
        let inner = lanea_utils::error::MissingInputError::new("repos", "config/REPOS.json", "create it");
        let err: anyhow::Error = lanea_utils::error::LaneaError::from(inner).into();
        let err = err.context("loading the repository registry");
        assert_eq!(classify_err(&err).code_value(), codes::MISSING_INPUT);
    }

    #[test]
    fn invalid_input_error_classifies_as_invalid_input() {
        let inner = lanea_utils::error::InvalidInputError::new("repos", "config/REPOS.json", "bad json");
        let err: anyhow::Error = lanea_utils::error::LaneaError::from(inner).into();
        assert_eq!(classify_err(&err).code_value(), codes::INVALID_INPUT);
    }

    #[test]
    fn unrelated_error_classifies_as_fatal() {
        let err = anyhow::anyhow!("boom");
        assert_eq!(classify_err(&err).code_value(), codes::FATAL);
    }
}
