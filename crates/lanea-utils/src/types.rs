//! Shared data model for the knowledge governance core.
//!
//! These types mirror the on-disk JSON shapes every component reads and
//! writes. Canonical ordering (lexicographic by the type's own "canonical
//! key") is enforced by the producing component, not by `Serialize` itself;
//! fields here are plain data, not behavior.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three file kinds this core persists, used to pick a normalization
/// algorithm before hashing (see `canonicalization::Canonicalizer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Json,
    Markdown,
    Text,
}

/// A scope string: `"system"` or `"repo:<repo_id>"`.
///
/// Kept as a thin wrapper rather than an enum so that repo ids remain
/// free-form strings from the registry, matching how scopes are written on
/// disk and in directory names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(pub String);

impl Scope {
    #[must_use]
    pub fn system() -> Self {
        Self("system".to_string())
    }

    #[must_use]
    pub fn repo(repo_id: impl AsRef<str>) -> Self {
        Self(format!("repo:{}", repo_id.as_ref()))
    }

    /// Returns the repo id if this scope names a single repository.
    #[must_use]
    pub fn repo_id(&self) -> Option<&str> {
        self.0.strip_prefix("repo:")
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.0 == "system"
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::system()
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a repository entry in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Active,
    Retired,
}

/// Commands a repo exposes for its own toolchain, resolved relative to `cwd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCommands {
    pub cwd: Utf8PathBuf,
    pub package_manager: String,
    pub install: Option<String>,
    pub lint: Option<String>,
    pub test: Option<String>,
    pub build: Option<String>,
}

/// One entry in the Repository Registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub path: Utf8PathBuf,
    pub active_branch: String,
    pub team_id: String,
    pub kind: String,
    pub status: RepoStatus,
    pub commands: RepoCommands,
}

/// The full Repository Registry: `repo_id -> entry`, plus the project's base dir.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRegistry {
    pub base_dir: Utf8PathBuf,
    pub repos: BTreeMap<String, RepoEntry>,
}

impl RepositoryRegistry {
    #[must_use]
    pub fn active_repo_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .repos
            .iter()
            .filter(|(_, r)| r.status == RepoStatus::Active)
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve a repo's absolute path: `base_dir` joined with its
    /// project-relative `path`. `None` if the repo id is unknown.
    #[must_use]
    pub fn resolve_repo_path(&self, repo_id: &str) -> Option<Utf8PathBuf> {
        self.repos.get(repo_id).map(|r| self.base_dir.join(&r.path))
    }
}

/// A single pinned evidence reference, as produced by the (external) scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceReference {
    pub evidence_id: String,
    pub repo_id: String,
    pub commit_sha: String,
    pub file_path: Utf8PathBuf,
    pub start_line: u32,
    pub end_line: u32,
}

impl EvidenceReference {
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.start_line <= self.end_line
    }
}

/// Per-repo dependency facts recorded at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDependencies {
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// The externally-produced per-repo scan artifact. Only `scanned_at` is
/// load-bearing for staleness; everything else a scanner writes passes
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scanned_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Repo Index: the authoritative "last scanned" reference for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIndex {
    pub scanned_at: DateTime<Utc>,
    pub head_sha: String,
    #[serde(default)]
    pub cross_repo_dependencies: Vec<String>,
    pub dependencies: RepoDependencies,
}

/// Severity level used across blocking issues, integration gaps and risks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// A claimed fact, grounded in one or more evidence references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub text: String,
    pub evidence_refs: Vec<String>,
}

/// An assumption the committee made because evidence was missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumption {
    pub text: String,
    pub evidence_missing: Vec<String>,
}

/// An open unknown the committee could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unknown {
    pub text: String,
    pub evidence_missing: Vec<String>,
}

/// A cross-repository integration edge asserted by the integration chair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationEdge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub contract: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub evidence_missing: Vec<String>,
    pub confidence: f64,
}

/// A named risk surfaced by a committee role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    pub text: String,
    pub severity: Severity,
}

/// Verdict a committee role assigns to its own output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitteeVerdict {
    EvidenceValid,
    EvidenceInvalid,
}

/// Committee Output: the raw, schema-validated artifact produced by a
/// committee run. Overwrites the prior artifact for its scope on each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeOutput {
    pub scope: Scope,
    pub facts: Vec<Fact>,
    pub assumptions: Vec<Assumption>,
    pub unknowns: Vec<Unknown>,
    pub integration_edges: Vec<IntegrationEdge>,
    pub risks: Vec<Risk>,
    pub verdict: CommitteeVerdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
}

/// Cap applied to every list-valued field on [`CommitteeOutput`].
pub const COMMITTEE_OUTPUT_LIST_CAP: usize = 20;

/// A blocking issue surfaced on a [`CommitteeStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingIssue {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub evidence_missing: Vec<String>,
    pub severity: Severity,
}

/// Confidence bucket derived from a committee run's blocking issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Next action recommended after a committee run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Proceed,
    RescanNeeded,
    DecisionNeeded,
}

/// Committee Status: derived deterministically from a [`CommitteeOutput`],
/// never hand-written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitteeStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    pub evidence_valid: bool,
    pub blocking_issues: Vec<BlockingIssue>,
    pub confidence: Confidence,
    pub next_action: NextAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_stale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staleness: Option<StalenessSnapshot>,
}

/// A cross-repo integration gap surfaced by the integration chair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationGap {
    pub id: String,
    pub repos: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
    #[serde(default)]
    pub evidence_missing: Vec<String>,
    pub severity: Severity,
}

/// Cap applied to `integration_gaps` on [`IntegrationStatus`].
pub const INTEGRATION_GAPS_CAP: usize = 15;

/// Integration Status: the cross-repo counterpart to [`CommitteeStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationStatus {
    pub evidence_valid: bool,
    pub integration_gaps: Vec<IntegrationGap>,
    pub decision_needed: bool,
}

/// Staleness Snapshot: the output of `evaluate*Staleness`, one per scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessSnapshot {
    pub scope: Scope,
    pub stale: bool,
    pub hard_stale: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub stale_repos: Vec<String>,
    #[serde(default)]
    pub hard_stale_repos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scanned_head_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_merge_event_time: Option<DateTime<Utc>>,
}

/// Sufficiency status, forming a one-directional lattice except for reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SufficiencyStatus {
    Insufficient,
    ProposedSufficient,
    Sufficient,
}

impl SufficiencyStatus {
    /// Whether `self -> next` is a legal transition.
    ///
    /// Legal moves: `insufficient -> proposed_sufficient -> sufficient`, or
    /// any status back to `insufficient` (reject).
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use SufficiencyStatus::{Insufficient, ProposedSufficient, Sufficient};
        match (self, next) {
            (_, Insufficient) => true,
            (Insufficient, ProposedSufficient) => true,
            (ProposedSufficient, Sufficient) => true,
            _ => false,
        }
    }
}

/// Staleness bucket recorded on a [`SufficiencyRecord`] at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleStatus {
    Fresh,
    SoftStale,
    HardStale,
}

/// A blocker recorded against a sufficiency decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub id: String,
    pub title: String,
    pub details: String,
}

/// Sufficiency Record, keyed by `(scope, knowledge_version)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SufficiencyRecord {
    pub scope: Scope,
    pub knowledge_version: String,
    pub status: SufficiencyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale_md_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub evidence_basis: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<Blocker>,
    pub stale_status: StaleStatus,
}

impl SufficiencyRecord {
    /// A record with `status: sufficient` must carry no blockers.
    #[must_use]
    pub fn is_internally_consistent(&self) -> bool {
        !(self.status == SufficiencyStatus::Sufficient && !self.blockers.is_empty())
    }
}

/// Which half of the reverse/forward lifecycle a project is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentPhase {
    Reverse,
    Forward,
}

/// Status of one half (reverse or forward) of the phase lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseHalfStatus {
    Open,
    InProgress,
    Closed,
}

/// State of one half (reverse or forward) of the phase lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseHalf {
    pub status: Option<PhaseHalfStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Prerequisites gating the reverse-to-forward transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasePrereqs {
    pub scan_complete: bool,
    pub sufficiency: bool,
    pub human_confirmed_v1: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_confirmed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_confirmed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_notes: Option<String>,
}

/// Phase State: the reverse/forward lifecycle for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    pub current_phase: Option<CurrentPhase>,
    pub reverse: PhaseHalf,
    pub forward: PhaseHalf,
    pub prereqs: PhasePrereqs,
}

/// Status of a review/update meeting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Open,
    WaitingForAnswer,
    ReadyToClose,
    Closed,
}

/// Meeting Session header record. Question/answer/decision history lives in
/// the append-only `QUESTIONS.jsonl` / `ANSWERS.jsonl` / `DECISIONS.jsonl`
/// sidecars next to it, not inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingSession {
    pub meeting_id: String,
    pub scope: Scope,
    pub status: MeetingStatus,
    pub knowledge_version_target: String,
    pub inputs: serde_json::Value,
    pub question_cursor: u32,
    pub asked_count: u32,
    pub answered_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_decision: Option<String>,
}

impl MeetingSession {
    #[must_use]
    pub fn is_internally_consistent(&self) -> bool {
        self.answered_count <= self.asked_count
    }
}

/// A question appended to a meeting's `QUESTIONS.jsonl` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingQuestion {
    pub meeting_id: String,
    pub sequence: u32,
    /// The ladder tier this question belongs to (`lanea_phase_api::Tier`'s
    /// `as_str()`), so a resumed meeting can recompute which tiers are
    /// already covered without re-parsing question text.
    pub tier: String,
    pub question: String,
    pub asked_at: DateTime<Utc>,
}

/// An answer appended to a meeting's `ANSWERS.jsonl` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingAnswer {
    pub meeting_id: String,
    pub sequence: u32,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
}

/// A close decision appended to a meeting's `DECISIONS.jsonl` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingDecision {
    pub meeting_id: String,
    pub decision: String,
    pub decided_at: DateTime<Utc>,
}

/// Status of a Decision Packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPacketStatus {
    Open,
    Answered,
}

/// Context block embedded in a Decision Packet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    pub summary: String,
    pub why_automation_failed: String,
    #[serde(default)]
    pub what_is_known: Vec<String>,
}

/// A single question posed by a Decision Packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionQuestion {
    pub id: String,
    pub question: String,
    pub expected_answer_type: String,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
}

/// Decision Packet: a structured human-escalation record. `decision_id` is
/// deterministic from `(scope, blocking_state, trigger)`, so creation is
/// idempotent per open decision — see `lanea-packet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPacket {
    pub decision_id: String,
    pub scope: Scope,
    pub trigger: String,
    pub blocking_state: String,
    pub context: DecisionContext,
    pub questions: Vec<DecisionQuestion>,
    pub assumptions_if_unanswered: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: DecisionPacketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answered_at: Option<DateTime<Utc>>,
}

/// Status of a Change Request as it moves through a meeting binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestStatus {
    Open,
    InMeeting,
    Processed,
}

/// Change Request: external input that can bind to a review/update meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub title: String,
    pub severity: Severity,
    pub scope: Scope,
    pub status: ChangeRequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_meeting_id: Option<String>,
}

/// One entry in a [`WorkStatus`]'s rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStatusHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Work Status Checkpoint: per-work-item stage tracking. Writing a new stage
/// appends to `history` and preserves the prior JSON in a sibling
/// `status-history.json` array before overwrite — see `lanea-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkStatus {
    pub work_id: String,
    pub current_stage: String,
    pub last_updated: DateTime<Utc>,
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_reason: Option<String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub repos: BTreeMap<String, String>,
    #[serde(default)]
    pub history: Vec<WorkStatusHistoryEntry>,
}
