//! Contract validators for every persisted artifact kind (§4.2).
//!
//! Each validator is pure and deterministic and produces a
//! [`ValidationOutcome`]: `{ ok, errors, normalized }`. Normalization is
//! limited to trimming strings, sorting lists by their canonical key, and
//! deduping — never filling in missing required data. Callers that get
//! `ok: false` must treat the file as absent-with-error, never as empty,
//! per `lanea_utils::error::InvalidInputError`.

use lanea_utils::types::{
    Blocker, ChangeRequest, CommitteeOutput, CommitteeStatus, DecisionPacket, EvidenceReference,
    IntegrationStatus, MeetingSession, PhaseState, RepoIndex, RepositoryRegistry, Scope,
    StalenessSnapshot, SufficiencyRecord, SufficiencyStatus, WorkStatus,
    COMMITTEE_OUTPUT_LIST_CAP, INTEGRATION_GAPS_CAP,
};

/// Result of validating one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome<T> {
    pub ok: bool,
    pub errors: Vec<String>,
    pub normalized: Option<T>,
}

impl<T> ValidationOutcome<T> {
    fn valid(value: T) -> Self {
        Self {
            ok: true,
            errors: Vec::new(),
            normalized: Some(value),
        }
    }

    fn invalid(errors: Vec<String>) -> Self {
        debug_assert!(!errors.is_empty());
        Self {
            ok: false,
            errors,
            normalized: None,
        }
    }
}

/// The capability every validator implements: `validate(obj) -> outcome`.
/// Consuming code that only knows an [`ArtifactKind`] at runtime can look
/// the right validator up through that tag rather than matching on the
/// concrete Rust type (a tagged registry keyed by artifact kind).
pub trait Validate: Sized {
    fn validate(self) -> ValidationOutcome<Self>;
}

/// Every persisted artifact kind this core validates, used to key the
/// tagged validator registry and to label `InvalidInputError`/
/// `MissingInputError` instances uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    RepositoryRegistry,
    EvidenceReference,
    RepoIndex,
    CommitteeOutput,
    CommitteeStatus,
    IntegrationStatus,
    StalenessSnapshot,
    SufficiencyRecord,
    PhaseState,
    MeetingSession,
    DecisionPacket,
    ChangeRequest,
    WorkStatus,
}

impl ArtifactKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RepositoryRegistry => "repository_registry",
            Self::EvidenceReference => "evidence_ref",
            Self::RepoIndex => "repo_index",
            Self::CommitteeOutput => "committee_output",
            Self::CommitteeStatus => "committee_status",
            Self::IntegrationStatus => "integration_status",
            Self::StalenessSnapshot => "staleness_snapshot",
            Self::SufficiencyRecord => "sufficiency_record",
            Self::PhaseState => "phase_state",
            Self::MeetingSession => "meeting_session",
            Self::DecisionPacket => "decision_packet",
            Self::ChangeRequest => "change_request",
            Self::WorkStatus => "work_status",
        }
    }
}

fn trim_all(items: Vec<String>) -> Vec<String> {
    items.into_iter().map(|s| s.trim().to_string()).collect()
}

fn sorted_deduped(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items.dedup();
    items
}

/// Truncate a list to `cap`. Dropped entries are the producing component's
/// concern to log, not this validator's.
fn cap_list<T>(mut items: Vec<T>, cap: usize) -> Vec<T> {
    items.truncate(cap);
    items
}

// ---------------------------------------------------------------------
// Repository Registry
// ---------------------------------------------------------------------

impl Validate for RepositoryRegistry {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.base_dir.as_str().trim().is_empty() {
            errors.push("base_dir must not be empty".to_string());
        }
        for (repo_id, entry) in &self.repos {
            if repo_id.trim().is_empty() {
                errors.push("repo id must not be empty".to_string());
            }
            if entry.path.as_str().trim().is_empty() {
                errors.push(format!("{repo_id}: path must not be empty"));
            }
            if entry.active_branch.trim().is_empty() {
                errors.push(format!("{repo_id}: active_branch must not be empty"));
            }
            if entry.commands.package_manager.trim().is_empty() {
                errors.push(format!(
                    "{repo_id}: commands.package_manager must not be empty"
                ));
            }
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        ValidationOutcome::valid(self)
    }
}

// ---------------------------------------------------------------------
// Evidence Reference
// ---------------------------------------------------------------------

impl Validate for EvidenceReference {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if !self.is_well_formed() {
            errors.push(format!(
                "{}: start_line ({}) > end_line ({})",
                self.evidence_id, self.start_line, self.end_line
            ));
        }
        if self.evidence_id.trim().is_empty() {
            errors.push("evidence_id must not be empty".to_string());
        }
        if self.commit_sha.trim().is_empty() {
            errors.push(format!("{}: commit_sha must not be empty", self.evidence_id));
        }
        if self.file_path.as_str().trim().is_empty() {
            errors.push(format!("{}: file_path must not be empty", self.evidence_id));
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        ValidationOutcome::valid(self)
    }
}

/// Validate a full evidence set, checking the cross-entry invariant that
/// `evidence_id` is unique within the set. Normalized output is sorted by
/// `file_path`.
pub fn validate_evidence_set(
    refs: Vec<EvidenceReference>,
) -> ValidationOutcome<Vec<EvidenceReference>> {
    let mut errors = Vec::new();
    let mut normalized = Vec::with_capacity(refs.len());
    let mut seen = std::collections::HashSet::new();

    for r in refs {
        let outcome = r.validate();
        match outcome.normalized {
            Some(valid) => {
                if !seen.insert(valid.evidence_id.clone()) {
                    errors.push(format!("duplicate evidence_id: {}", valid.evidence_id));
                }
                normalized.push(valid);
            }
            None => errors.extend(outcome.errors),
        }
    }

    if !errors.is_empty() {
        return ValidationOutcome::invalid(errors);
    }

    normalized.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    ValidationOutcome::valid(normalized)
}

// ---------------------------------------------------------------------
// Repo Index
// ---------------------------------------------------------------------

impl Validate for RepoIndex {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.head_sha.trim().is_empty() {
            errors.push("head_sha must not be empty".to_string());
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        let mut normalized = self;
        normalized.cross_repo_dependencies =
            sorted_deduped(trim_all(normalized.cross_repo_dependencies));
        normalized.dependencies.depends_on =
            sorted_deduped(trim_all(normalized.dependencies.depends_on));
        ValidationOutcome::valid(normalized)
    }
}

// ---------------------------------------------------------------------
// Committee Output / Status / Integration Status
// ---------------------------------------------------------------------

impl Validate for CommitteeOutput {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.scope.as_str().trim().is_empty() {
            errors.push("scope must not be empty".to_string());
        }
        for fact in &self.facts {
            if fact.text.trim().is_empty() {
                errors.push("fact.text must not be empty".to_string());
            }
        }
        for edge in &self.integration_edges {
            if !(0.0..=1.0).contains(&edge.confidence) {
                errors.push(format!(
                    "integration_edge {}->{}: confidence {} out of [0,1]",
                    edge.from, edge.to, edge.confidence
                ));
            }
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }

        let mut normalized = self;
        normalized.facts = cap_list(normalized.facts, COMMITTEE_OUTPUT_LIST_CAP);
        normalized.assumptions = cap_list(normalized.assumptions, COMMITTEE_OUTPUT_LIST_CAP);
        normalized.unknowns = cap_list(normalized.unknowns, COMMITTEE_OUTPUT_LIST_CAP);
        normalized.integration_edges =
            cap_list(normalized.integration_edges, COMMITTEE_OUTPUT_LIST_CAP);
        normalized.risks = cap_list(normalized.risks, COMMITTEE_OUTPUT_LIST_CAP);

        normalized.facts.sort_by(|a, b| a.text.cmp(&b.text));
        normalized.assumptions.sort_by(|a, b| a.text.cmp(&b.text));
        normalized.unknowns.sort_by(|a, b| a.text.cmp(&b.text));
        normalized
            .integration_edges
            .sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        normalized.risks.sort_by(|a, b| a.text.cmp(&b.text));

        ValidationOutcome::valid(normalized)
    }
}

impl Validate for CommitteeStatus {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut normalized = self;
        normalized.blocking_issues.sort_by(|a, b| a.id.cmp(&b.id));
        ValidationOutcome::valid(normalized)
    }
}

impl Validate for IntegrationStatus {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut normalized = self;
        normalized.integration_gaps = cap_list(normalized.integration_gaps, INTEGRATION_GAPS_CAP);
        normalized.integration_gaps.sort_by(|a, b| a.id.cmp(&b.id));
        ValidationOutcome::valid(normalized)
    }
}

// ---------------------------------------------------------------------
// Staleness Snapshot
// ---------------------------------------------------------------------

impl Validate for StalenessSnapshot {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.stale != !self.reasons.is_empty() {
            errors.push("stale must be equivalent to reasons being non-empty".to_string());
        }
        if self.hard_stale && !self.stale {
            errors.push("hard_stale implies stale".to_string());
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        let mut normalized = self;
        normalized.reasons = sorted_deduped(trim_all(normalized.reasons));
        normalized.stale_repos = sorted_deduped(trim_all(normalized.stale_repos));
        normalized.hard_stale_repos = sorted_deduped(trim_all(normalized.hard_stale_repos));
        ValidationOutcome::valid(normalized)
    }
}

// ---------------------------------------------------------------------
// Sufficiency Record
// ---------------------------------------------------------------------

impl Validate for SufficiencyRecord {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if !self.is_internally_consistent() {
            errors.push("status=sufficient requires blockers to be empty".to_string());
        }
        if self.knowledge_version.trim().is_empty() {
            errors.push("knowledge_version must not be empty".to_string());
        }
        if matches!(self.status, SufficiencyStatus::Sufficient) && self.decided_by.is_none() {
            errors.push("status=sufficient requires decided_by".to_string());
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        let mut normalized = self;
        normalized.evidence_basis = sorted_deduped(trim_all(normalized.evidence_basis));
        normalized
            .blockers
            .sort_by(|a: &Blocker, b: &Blocker| a.id.cmp(&b.id));
        ValidationOutcome::valid(normalized)
    }
}

// ---------------------------------------------------------------------
// Phase State
// ---------------------------------------------------------------------

impl Validate for PhaseState {
    fn validate(self) -> ValidationOutcome<Self> {
        ValidationOutcome::valid(self)
    }
}

// ---------------------------------------------------------------------
// Meeting Session
// ---------------------------------------------------------------------

impl Validate for MeetingSession {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if !self.is_internally_consistent() {
            errors.push("answered_count must not exceed asked_count".to_string());
        }
        if self.meeting_id.trim().is_empty() {
            errors.push("meeting_id must not be empty".to_string());
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        ValidationOutcome::valid(self)
    }
}

// ---------------------------------------------------------------------
// Decision Packet
// ---------------------------------------------------------------------

impl Validate for DecisionPacket {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.decision_id.trim().is_empty() {
            errors.push("decision_id must not be empty".to_string());
        }
        if self.questions.is_empty() {
            errors.push("a decision packet must carry at least one question".to_string());
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        ValidationOutcome::valid(self)
    }
}

// ---------------------------------------------------------------------
// Change Request
// ---------------------------------------------------------------------

impl Validate for ChangeRequest {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("id must not be empty".to_string());
        }
        if self.title.trim().is_empty() {
            errors.push(format!("{}: title must not be empty", self.id));
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        ValidationOutcome::valid(self)
    }
}

// ---------------------------------------------------------------------
// Work Status
// ---------------------------------------------------------------------

impl Validate for WorkStatus {
    fn validate(self) -> ValidationOutcome<Self> {
        let mut errors = Vec::new();
        if self.work_id.trim().is_empty() {
            errors.push("work_id must not be empty".to_string());
        }
        if self.current_stage.trim().is_empty() {
            errors.push("current_stage must not be empty".to_string());
        }
        if self.blocked && self.blocking_reason.is_none() {
            errors.push("blocked=true requires blocking_reason".to_string());
        }
        if !errors.is_empty() {
            return ValidationOutcome::invalid(errors);
        }
        ValidationOutcome::valid(self)
    }
}

/// A scope string is well-formed iff it is `"system"` or `"repo:<id>"` with
/// a non-empty id. Shared by components that accept a scope from an
/// external caller (CLI, meeting binding) rather than from disk.
#[must_use]
pub fn validate_scope(scope: &Scope) -> bool {
    scope.is_system() || scope.repo_id().is_some_and(|id| !id.is_empty())
}
