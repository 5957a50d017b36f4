//! Committee Orchestrator (§4.5): architect/skeptic/integration-chair/
//! qa-strategist runs, LLM output validation against the allowed-evidence
//! set, and the deterministic derivation of `CommitteeStatus`/
//! `IntegrationStatus` from a raw `CommitteeOutput`.

pub mod derive;
pub mod orchestrator;
pub mod output;
pub mod payload;
pub mod types;

pub use derive::{derive_committee_status, derive_integration_status, integration_status_from_unknown_refs, RoleContribution};
pub use orchestrator::{run_integration_committee, run_qa_strategist, run_repo_committee, run_repo_committees};
pub use output::{validate_role_output, HardFailure, RoleValidation};
pub use types::{CommitteeRole, IntegrationCommitteeOutcome, QaStrategistOutcome, RepoCommitteeOutcome, RunState};
