//! Review/Update Meeting (§4.8): the one-question-at-a-time session
//! lifecycle that drives a scope through the question ladder
//! (`lanea-phase-api`), binds open Change Requests, and dispatches a
//! meeting-kind-specific close decision that may confirm sufficiency,
//! bump the knowledge version, or approve intake.
//!
//! A meeting id carries its kind as a prefix (`UM-` update, `RM-` review)
//! followed by a `YYYYMMDD_HHMMSS` timestamp and the scope slug — this is
//! the only place a meeting's kind is recorded, so every operation that
//! needs it recovers it by re-parsing the id rather than storing it twice.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lanea_committee::{run_integration_committee, run_repo_committee};
use lanea_git::GitSurface;
use lanea_llm::LlmOracle;
use lanea_phase_api::{next_tier, Tier};
use lanea_staleness::{evaluate_scope_staleness, StalenessThreshold};
use lanea_utils::atomic_write::write_file_atomic;
use lanea_utils::canonicalization::emit_jcs;
use lanea_utils::jsonl::{append_jsonl_line, read_json_opt, read_jsonl};
use lanea_utils::paths::{
    change_request_path, change_requests_dir, integration_status_path, knowledge_version_path,
    meeting_answer_md_path, meeting_answers_path, meeting_decisions_path, meeting_dir, meeting_latest_path,
    meeting_questions_path, meeting_record_path, meeting_session_md_path, meeting_session_path,
    repo_committee_status_path,
};
use lanea_utils::types::{
    ChangeRequest, ChangeRequestStatus, CommitteeStatus, IntegrationStatus, MeetingAnswer, MeetingDecision,
    MeetingQuestion, MeetingSession, MeetingStatus, RepositoryRegistry, Scope,
};
use lanea_validation::Validate;

/// Number of rungs on the question ladder (`Refresh` plus the seven
/// always-applicable tiers) — a meeting never asks more than this many
/// questions regardless of how `next_tier` is driven.
const MAX_QUESTIONS: u32 = 8;

/// A note containing this token lets `approve_intake` close over an
/// unconfirmed sufficiency record — a human override recorded in the
/// meeting's own close notes rather than a silent bypass.
const OVERRIDE_TOKEN: &str = "OVERRIDE_SUFFICIENCY";

/// Which kind of meeting a session is, recovered from its id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingKind {
    /// `UM-*`: intake of new/changed requirements into the knowledge base.
    Update,
    /// `RM-*`: periodic confirmation that existing knowledge is still sufficient.
    Review,
}

impl MeetingKind {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            MeetingKind::Update => "UM",
            MeetingKind::Review => "RM",
        }
    }

    #[must_use]
    pub fn from_meeting_id(meeting_id: &str) -> Option<Self> {
        if meeting_id.starts_with("UM-") {
            Some(MeetingKind::Update)
        } else if meeting_id.starts_with("RM-") {
            Some(MeetingKind::Review)
        } else {
            None
        }
    }

    /// Close decisions this kind of meeting is allowed to end on.
    #[must_use]
    pub fn allowed_decisions(self) -> &'static [&'static str] {
        match self {
            MeetingKind::Update => &[
                "approve_intake",
                "revise_scans",
                "open_decisions",
                "abort",
                "bump_patch",
                "bump_minor",
                "bump_major",
                "no_bump",
            ],
            MeetingKind::Review => &["confirm_sufficiency", "reject_sufficiency", "defer"],
        }
    }
}

/// Outcome of `close`: a gate refusal is a structured `ok: false` result,
/// never a raised error (§7 "Gate-refusal").
#[derive(Debug, Clone)]
pub struct MeetingCloseOutcome {
    pub ok: bool,
    pub message: Option<String>,
    pub session: MeetingSession,
}

impl MeetingCloseOutcome {
    fn refuse(session: MeetingSession, message: impl Into<String>) -> Self {
        Self { ok: false, message: Some(message.into()), session }
    }

    fn accept(session: MeetingSession) -> Self {
        Self { ok: true, message: None, session }
    }
}

fn scope_slug(scope: &Scope) -> String {
    scope.as_str().replace(':', "-")
}

/// Deterministic id for a meeting opened right now: `<prefix>-<timestamp>__<scope-slug>`.
#[must_use]
pub fn meeting_id_for(kind: MeetingKind, scope: &Scope, now: DateTime<Utc>) -> String {
    format!("{}-{}__{}", kind.prefix(), now.format("%Y%m%d_%H%M%S"), scope_slug(scope))
}

fn load(meeting_id: &str) -> Result<MeetingSession> {
    read_json_opt(&meeting_session_path(meeting_id))?
        .with_context(|| format!("no meeting session found for {meeting_id}"))
}

fn render_markdown(session: &MeetingSession) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Meeting {}\n\n", session.meeting_id));
    out.push_str(&format!("- scope: `{}`\n", session.scope));
    out.push_str(&format!("- status: {:?}\n", session.status));
    out.push_str(&format!("- knowledge_version_target: {}\n", session.knowledge_version_target));
    out.push_str(&format!("- asked: {}, answered: {}\n", session.asked_count, session.answered_count));
    if let Some(decision) = &session.closed_decision {
        out.push_str(&format!("- closed_decision: {decision}\n"));
    }
    out
}

fn persist(session: &MeetingSession) -> Result<MeetingSession> {
    let outcome = session.clone().validate();
    if !outcome.ok {
        bail!("meeting session failed validation: {}", outcome.errors.join("; "));
    }
    let normalized = outcome.normalized.expect("ok implies normalized");
    let json = emit_jcs(&normalized)?;
    write_file_atomic(&meeting_session_path(&normalized.meeting_id), &json)?;
    write_file_atomic(&meeting_session_md_path(&normalized.meeting_id), &render_markdown(&normalized))?;
    Ok(normalized)
}

fn committee_status_path_for(scope: &Scope) -> camino::Utf8PathBuf {
    match scope.repo_id() {
        Some(repo_id) => repo_committee_status_path(repo_id),
        None => integration_status_path(),
    }
}

fn integration_gap_ids() -> Result<Vec<String>> {
    Ok(read_json_opt::<IntegrationStatus>(&integration_status_path())?
        .map(|status| status.integration_gaps.into_iter().map(|gap| gap.id).collect())
        .unwrap_or_default())
}

/// Open `kind` against `scope`: snapshots the current staleness,
/// sufficiency pointer, committee status path and open-decision set into
/// the session's `inputs`, writes the session, and binds up to 10 of the
/// oldest open Change Requests in scope to this meeting.
pub fn start(
    kind: MeetingKind,
    scope: &Scope,
    knowledge_version_target: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<MeetingSession> {
    let meeting_id = meeting_id_for(kind, scope, now);
    let staleness = evaluate_scope_staleness(scope, now, registry, git, threshold)?;
    let sufficiency_pointer = lanea_sufficiency::read_latest(scope)?;
    let open_decisions = lanea_packet::list_open_packets_for_scope(scope)?;

    let inputs = serde_json::json!({
        "scope_was_stale": staleness.stale,
        "staleness": staleness,
        "sufficiency_pointer": sufficiency_pointer,
        "committee_status_path": committee_status_path_for(scope).as_str(),
        "open_decision_ids": open_decisions.iter().map(|d| d.decision_id.clone()).collect::<Vec<_>>(),
        "integration_gap_ids": integration_gap_ids()?,
    });

    let session = MeetingSession {
        meeting_id: meeting_id.clone(),
        scope: scope.clone(),
        status: MeetingStatus::Open,
        knowledge_version_target: knowledge_version_target.to_string(),
        inputs,
        question_cursor: 0,
        asked_count: 0,
        answered_count: 0,
        created_at: now,
        updated_at: now,
        closed_at: None,
        closed_decision: None,
    };

    let session = persist(&session)?;
    bind_oldest_open_change_requests(scope, &meeting_id, 10)?;
    Ok(session)
}

enum CommitteeStep {
    Repo(String),
    Integration,
}

fn repo_committee_valid(repo_id: &str) -> Result<bool> {
    Ok(read_json_opt::<CommitteeStatus>(&repo_committee_status_path(repo_id))?.is_some_and(|s| s.evidence_valid))
}

fn integration_valid() -> Result<bool> {
    Ok(read_json_opt::<IntegrationStatus>(&integration_status_path())?.is_some_and(|s| s.evidence_valid))
}

fn committee_step_needed(scope: &Scope, registry: &RepositoryRegistry) -> Result<Option<CommitteeStep>> {
    match scope.repo_id() {
        Some(repo_id) => {
            if repo_committee_valid(repo_id)? {
                Ok(None)
            } else {
                Ok(Some(CommitteeStep::Repo(repo_id.to_string())))
            }
        }
        None => {
            for repo_id in registry.active_repo_ids() {
                if !repo_committee_valid(repo_id)? {
                    return Ok(Some(CommitteeStep::Repo(repo_id.to_string())));
                }
            }
            if integration_valid()? {
                Ok(None)
            } else {
                Ok(Some(CommitteeStep::Integration))
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_committee_step(
    step: &CommitteeStep,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    llm: &dyn LlmOracle,
    threshold: StalenessThreshold,
    force: bool,
) -> Result<()> {
    match step {
        CommitteeStep::Repo(repo_id) => {
            run_repo_committee(repo_id, now, registry, git, llm, threshold, force)?;
        }
        CommitteeStep::Integration => {
            run_integration_committee(now, registry, git, llm, threshold, force)?;
        }
    }
    Ok(())
}

fn answered_tiers(meeting_id: &str) -> Result<Vec<Tier>> {
    let questions: Vec<MeetingQuestion> = read_jsonl(&meeting_questions_path(meeting_id))?;
    let answers: Vec<MeetingAnswer> = read_jsonl(&meeting_answers_path(meeting_id))?;
    let answered_sequences: BTreeSet<u32> = answers.iter().map(|a| a.sequence).collect();
    Ok(questions
        .into_iter()
        .filter(|q| answered_sequences.contains(&q.sequence))
        .filter_map(|q| Tier::from_str_opt(&q.tier))
        .collect())
}

fn render_question(tier: Tier) -> String {
    match tier {
        Tier::Refresh => {
            "The scope looked stale when this meeting opened. Confirm the refresh is complete, \
             or describe what still needs to change before it is."
                .to_string()
        }
        Tier::Vision => "What is the product vision for this scope over the next planning horizon?".to_string(),
        Tier::Requirements => {
            "What functional requirements must this scope satisfy that are not yet captured in \
             committee facts?"
                .to_string()
        }
        Tier::DomainData => "What domain entities and invariants govern this scope's business logic?".to_string(),
        Tier::Data => "What persistent data stores and schemas does this scope own or depend on?".to_string(),
        Tier::Api => "What external or cross-repo API contracts does this scope expose or consume?".to_string(),
        Tier::Infra => {
            "What infrastructure (deployment targets, CI, runtime environment) does this scope require?"
                .to_string()
        }
        Tier::Ops => "What operational concerns (on-call, alerting, rollback) apply to this scope?".to_string(),
    }
}

/// Advance a meeting one step: if its scope's committee output isn't valid
/// yet, run the next needed committee step; otherwise ask the next ladder
/// question, or mark the session `ready_to_close` once the ladder is
/// exhausted. Never asks a second question while one is unanswered — the
/// caller must `answer` first.
#[allow(clippy::too_many_arguments)]
pub fn continue_meeting(
    meeting_id: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    llm: &dyn LlmOracle,
    threshold: StalenessThreshold,
    force: bool,
) -> Result<MeetingSession> {
    let mut session = load(meeting_id)?;

    if matches!(session.status, MeetingStatus::WaitingForAnswer | MeetingStatus::Closed | MeetingStatus::ReadyToClose)
    {
        return Ok(session);
    }

    if let Some(step) = committee_step_needed(&session.scope, registry)? {
        run_committee_step(&step, now, registry, git, llm, threshold, force)?;
        session.updated_at = now;
        return persist(&session);
    }

    let tiers = answered_tiers(meeting_id)?;
    let scope_was_stale = session.inputs.get("scope_was_stale").and_then(|v| v.as_bool()).unwrap_or(false);
    let any_asked = session.asked_count > 0;

    let next = if session.asked_count >= MAX_QUESTIONS { None } else { next_tier(&tiers, scope_was_stale, any_asked) };

    match next {
        None => {
            session.status = MeetingStatus::ReadyToClose;
            session.updated_at = now;
            persist(&session)
        }
        Some(tier) => {
            let sequence = session.asked_count;
            let question = MeetingQuestion {
                meeting_id: meeting_id.to_string(),
                sequence,
                tier: tier.as_str().to_string(),
                question: render_question(tier),
                asked_at: now,
            };
            append_jsonl_line(&meeting_questions_path(meeting_id), &question)?;

            session.asked_count += 1;
            session.question_cursor += 1;
            session.status = MeetingStatus::WaitingForAnswer;
            session.updated_at = now;
            persist(&session)
        }
    }
}

/// Record the answer to the single outstanding question and reopen the
/// session for `continue_meeting` to drive the next step.
pub fn answer(meeting_id: &str, answer_text: &str, now: DateTime<Utc>) -> Result<MeetingSession> {
    let mut session = load(meeting_id)?;
    if session.status != MeetingStatus::WaitingForAnswer {
        bail!("meeting {meeting_id} has no outstanding question to answer");
    }
    if session.answered_count + 1 != session.asked_count {
        bail!("meeting {meeting_id} has more than one unanswered question outstanding");
    }

    let sequence = session.asked_count - 1;
    write_file_atomic(&meeting_answer_md_path(meeting_id, sequence), answer_text)?;

    let record = MeetingAnswer {
        meeting_id: meeting_id.to_string(),
        sequence,
        answer: answer_text.to_string(),
        answered_at: now,
    };
    append_jsonl_line(&meeting_answers_path(meeting_id), &record)?;

    session.answered_count += 1;
    session.status = MeetingStatus::Open;
    session.updated_at = now;
    persist(&session)
}

fn persist_change_request(cr: &ChangeRequest) -> Result<()> {
    let outcome = cr.clone().validate();
    if !outcome.ok {
        bail!("change request failed validation: {}", outcome.errors.join("; "));
    }
    let normalized = outcome.normalized.expect("ok implies normalized");
    let json = emit_jcs(&normalized)?;
    write_file_atomic(&change_request_path(&normalized.id), &json)?;
    Ok(())
}

fn list_change_request_files() -> Result<Vec<String>> {
    let dir = change_requests_dir();
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let mut names: Vec<String> = std::fs::read_dir(dir.as_std_path())?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.ends_with(".json"))
        .collect();
    names.sort();
    Ok(names)
}

/// Bind up to `limit` of the oldest open Change Requests in `scope` to
/// `meeting_id`, in filename order (the lexicographic id order this
/// workspace uses for every append-ordered artifact).
fn bind_oldest_open_change_requests(scope: &Scope, meeting_id: &str, limit: usize) -> Result<usize> {
    let dir = change_requests_dir();
    let mut bound = 0;
    for name in list_change_request_files()? {
        if bound >= limit {
            break;
        }
        let path = dir.join(&name);
        let Some(mut cr) = read_json_opt::<ChangeRequest>(&path)? else { continue };
        if cr.scope != *scope || cr.status != ChangeRequestStatus::Open {
            continue;
        }
        cr.status = ChangeRequestStatus::InMeeting;
        cr.linked_meeting_id = Some(meeting_id.to_string());
        persist_change_request(&cr)?;
        bound += 1;
    }
    Ok(bound)
}

fn mark_bound_change_requests_processed(meeting_id: &str) -> Result<()> {
    let dir = change_requests_dir();
    for name in list_change_request_files()? {
        let path = dir.join(&name);
        let Some(mut cr) = read_json_opt::<ChangeRequest>(&path)? else { continue };
        if cr.linked_meeting_id.as_deref() == Some(meeting_id) && cr.status == ChangeRequestStatus::InMeeting {
            cr.status = ChangeRequestStatus::Processed;
            persist_change_request(&cr)?;
        }
    }
    Ok(())
}

fn write_intake_approval(meeting_id: &str, scope: &Scope, by: &str, now: DateTime<Utc>) -> Result<()> {
    let artifact = serde_json::json!({
        "scope": scope,
        "approved_by": by,
        "approved_at": now,
    });
    let json = emit_jcs(&artifact)?;
    write_file_atomic(&meeting_dir(meeting_id).join("INTAKE_APPROVAL.json"), &json)?;
    Ok(())
}

fn write_meeting_record(session: &MeetingSession) -> Result<()> {
    let record = serde_json::json!({
        "meeting_id": session.meeting_id,
        "scope": session.scope,
        "closed_decision": session.closed_decision,
        "closed_at": session.closed_at,
        "knowledge_version_target": session.knowledge_version_target,
    });
    let json = emit_jcs(&record)?;
    write_file_atomic(&meeting_record_path(&session.meeting_id), &json)?;
    write_file_atomic(&meeting_latest_path(&scope_slug(&session.scope)), &json)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BumpKind {
    Patch,
    Minor,
    Major,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnowledgeVersionRecord {
    version: String,
    updated_at: DateTime<Utc>,
}

fn current_knowledge_version() -> Result<String> {
    Ok(read_json_opt::<KnowledgeVersionRecord>(&knowledge_version_path())?
        .map(|r| r.version)
        .unwrap_or_else(|| "v0.0.0".to_string()))
}

fn parse_version(v: &str) -> (u32, u32, u32) {
    let rest = v.strip_prefix('v').unwrap_or(v);
    let mut parts = rest.split('.');
    let major = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (major, minor, patch)
}

fn bump_knowledge_version(kind: BumpKind, now: DateTime<Utc>) -> Result<String> {
    let (major, minor, patch) = parse_version(&current_knowledge_version()?);
    let next = match kind {
        BumpKind::Major => format!("v{}.0.0", major + 1),
        BumpKind::Minor => format!("v{major}.{}.0", minor + 1),
        BumpKind::Patch => format!("v{major}.{minor}.{}", patch + 1),
    };
    let record = KnowledgeVersionRecord { version: next.clone(), updated_at: now };
    let json = emit_jcs(&record)?;
    write_file_atomic(&knowledge_version_path(), &json)?;
    Ok(next)
}

/// Close a meeting on `decision`. Refuses (structured `ok: false`, never an
/// error) if a question is still outstanding, if `decision` isn't valid for
/// this meeting's kind, or if the decision's own gate (hard-staleness,
/// incomplete committee output, unconfirmed sufficiency) isn't satisfied.
#[allow(clippy::too_many_arguments)]
pub fn close(
    meeting_id: &str,
    decision: &str,
    by: &str,
    notes: Option<&str>,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    threshold: StalenessThreshold,
) -> Result<MeetingCloseOutcome> {
    let mut session = load(meeting_id)?;

    if session.asked_count != session.answered_count {
        return Ok(MeetingCloseOutcome::refuse(session, "every asked question must be answered before close"));
    }

    let Some(kind) = MeetingKind::from_meeting_id(meeting_id) else {
        bail!("meeting_id {meeting_id} does not carry a recognizable UM-/RM- prefix");
    };
    if !kind.allowed_decisions().contains(&decision) {
        return Ok(MeetingCloseOutcome::refuse(
            session,
            format!("{decision} is not a valid close decision for this meeting kind"),
        ));
    }

    let scope = session.scope.clone();

    match decision {
        "approve_intake" => {
            let staleness = evaluate_scope_staleness(&scope, now, registry, git, threshold)?;
            if staleness.hard_stale {
                lanea_packet::ensure_refresh_required_packet(
                    &scope,
                    &staleness.reasons,
                    staleness.repo_head_sha.as_deref(),
                    staleness.last_scanned_head_sha.as_deref(),
                    staleness.last_scan_time,
                    staleness.last_merge_event_time,
                    now,
                )?;
                return Ok(MeetingCloseOutcome::refuse(
                    session,
                    "scope is hard-stale; refresh required before intake can be approved",
                ));
            }
            if staleness.reasons.iter().any(|r| r == "coverage_incomplete") {
                return Ok(MeetingCloseOutcome::refuse(session, "scan coverage is incomplete across repos in scope"));
            }
            if committee_step_needed(&scope, registry)?.is_some() {
                return Ok(MeetingCloseOutcome::refuse(session, "committee output is not yet valid for this scope"));
            }
            let override_sufficiency = notes.is_some_and(|n| n.contains(OVERRIDE_TOKEN));
            if !override_sufficiency
                && !lanea_sufficiency::is_sufficient_for(&scope, &session.knowledge_version_target)?
            {
                return Ok(MeetingCloseOutcome::refuse(
                    session,
                    "sufficiency is not confirmed for the target knowledge version",
                ));
            }
            write_intake_approval(meeting_id, &scope, by, now)?;
            mark_bound_change_requests_processed(meeting_id)?;
        }
        "confirm_sufficiency" => {
            let staleness = evaluate_scope_staleness(&scope, now, registry, git, threshold)?;
            if staleness.stale {
                return Ok(MeetingCloseOutcome::refuse(session, "scope is stale; sufficiency cannot be confirmed"));
            }
            let outcome = lanea_sufficiency::approve(&scope, &session.knowledge_version_target, by, now, registry, git, threshold)?;
            if !outcome.ok {
                return Ok(MeetingCloseOutcome::refuse(session, outcome.message.unwrap_or_default()));
            }
        }
        "reject_sufficiency" => {
            lanea_sufficiency::reject(&scope, &session.knowledge_version_target, by, notes.unwrap_or(""), now)?;
        }
        "bump_patch" => {
            bump_knowledge_version(BumpKind::Patch, now)?;
        }
        "bump_minor" => {
            bump_knowledge_version(BumpKind::Minor, now)?;
        }
        "bump_major" => {
            bump_knowledge_version(BumpKind::Major, now)?;
        }
        "no_bump" | "revise_scans" | "open_decisions" | "abort" | "defer" => {}
        _ => unreachable!("validated against kind.allowed_decisions() above"),
    }

    session.status = MeetingStatus::Closed;
    session.closed_at = Some(now);
    session.closed_decision = Some(decision.to_string());
    session.updated_at = now;
    let session = persist(&session)?;

    let record =
        MeetingDecision { meeting_id: meeting_id.to_string(), decision: decision.to_string(), decided_at: now };
    append_jsonl_line(&meeting_decisions_path(meeting_id), &record)?;
    write_meeting_record(&session)?;

    Ok(MeetingCloseOutcome::accept(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use lanea_git::fake::FakeGit;
    use lanea_llm::fake::FakeOracle;
    use lanea_utils::paths::{repo_index_path, repo_scan_path, with_isolated_home};
    use lanea_utils::types::{Confidence, NextAction, RepoCommands, RepoEntry, RepoIndex, RepoStatus, ScanRecord, Severity};
    use std::collections::BTreeMap;

    fn registry() -> RepositoryRegistry {
        let mut repos = BTreeMap::new();
        repos.insert(
            "repo-a".to_string(),
            RepoEntry {
                path: Utf8PathBuf::from("repo-a"),
                active_branch: "main".to_string(),
                team_id: "team-a".to_string(),
                kind: "service".to_string(),
                status: RepoStatus::Active,
                commands: RepoCommands {
                    cwd: Utf8PathBuf::from("."),
                    package_manager: "cargo".to_string(),
                    install: None,
                    lint: None,
                    test: None,
                    build: None,
                },
            },
        );
        RepositoryRegistry { base_dir: Utf8PathBuf::from("/repos"), repos }
    }

    fn complete_coverage(now: DateTime<Utc>, git: &FakeGit) {
        git.set_head("/repos/repo-a", "sha-a", now);

        let idx = RepoIndex { scanned_at: now, head_sha: "sha-a".to_string(), cross_repo_dependencies: vec![], dependencies: Default::default() };
        write_file_atomic(&repo_index_path("repo-a"), &emit_jcs(&idx).unwrap()).unwrap();

        let scan = ScanRecord { scanned_at: now, extra: serde_json::Map::new() };
        write_file_atomic(&repo_scan_path("repo-a"), &emit_jcs(&scan).unwrap()).unwrap();
    }

    fn mark_repo_committee_valid(repo_id: &str) {
        write_file_atomic(
            &repo_committee_status_path(repo_id),
            &emit_jcs(&CommitteeStatus {
                repo_id: Some(repo_id.to_string()),
                evidence_valid: true,
                blocking_issues: Vec::new(),
                confidence: Confidence::High,
                next_action: NextAction::Proceed,
                degraded: None,
                degraded_reason: None,
                stale: Some(false),
                hard_stale: Some(false),
                staleness: None,
            })
            .unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn start_snapshots_staleness_and_binds_open_change_requests() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);

        let cr = ChangeRequest {
            id: "cr-1".to_string(),
            request_type: "feature".to_string(),
            title: "add widget".to_string(),
            severity: Severity::Medium,
            scope: Scope::repo("repo-a"),
            status: ChangeRequestStatus::Open,
            linked_meeting_id: None,
        };
        write_file_atomic(&change_request_path(&cr.id), &emit_jcs(&cr).unwrap()).unwrap();

        let session = start(
            MeetingKind::Update,
            &Scope::repo("repo-a"),
            "v1.0.0",
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
        )
        .unwrap();

        assert!(session.meeting_id.starts_with("UM-20260101_000000__repo-repo-a"));
        assert_eq!(session.status, MeetingStatus::Open);

        let bound: ChangeRequest = read_json_opt(&change_request_path("cr-1")).unwrap().unwrap();
        assert_eq!(bound.status, ChangeRequestStatus::InMeeting);
        assert_eq!(bound.linked_meeting_id.as_deref(), Some(session.meeting_id.as_str()));
    }

    #[test]
    fn continue_meeting_asks_one_question_at_a_time() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        mark_repo_committee_valid("repo-a");

        let session = start(
            MeetingKind::Review,
            &Scope::repo("repo-a"),
            "v1.0.0",
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
        )
        .unwrap();

        let llm = FakeOracle::new(vec![]);
        let session =
            continue_meeting(&session.meeting_id, now, &registry, &git, &llm, StalenessThreshold::default(), false)
                .unwrap();
        assert_eq!(session.status, MeetingStatus::WaitingForAnswer);
        assert_eq!(session.asked_count, 1);

        // A second continue before an answer must not ask a second question.
        let again =
            continue_meeting(&session.meeting_id, now, &registry, &git, &llm, StalenessThreshold::default(), false)
                .unwrap();
        assert_eq!(again.asked_count, 1);
        assert_eq!(again.status, MeetingStatus::WaitingForAnswer);
    }

    #[test]
    fn continue_meeting_waits_on_committee_before_the_ladder() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        // Committee status deliberately left unwritten: `committee_step_needed`
        // must report the repo step before any ladder question is asked.
        assert!(matches!(
            committee_step_needed(&Scope::repo("repo-a"), &registry).unwrap(),
            Some(CommitteeStep::Repo(ref id)) if id == "repo-a"
        ));

        mark_repo_committee_valid("repo-a");
        assert!(committee_step_needed(&Scope::repo("repo-a"), &registry).unwrap().is_none());
    }

    #[test]
    fn answer_then_close_confirm_sufficiency_succeeds_once_sufficient() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        mark_repo_committee_valid("repo-a");

        let scope = Scope::repo("repo-a");
        lanea_sufficiency::approve(&scope, "v1.0.0", "alice", now, &registry, &git, StalenessThreshold::default())
            .unwrap();

        let session = start(MeetingKind::Review, &scope, "v1.0.0", now, &registry, &git, StalenessThreshold::default())
            .unwrap();

        let llm = FakeOracle::new(vec![]);
        let mut session =
            continue_meeting(&session.meeting_id, now, &registry, &git, &llm, StalenessThreshold::default(), false)
                .unwrap();

        // Walk the whole ladder, answering each question as it's asked.
        while session.status == MeetingStatus::WaitingForAnswer {
            session = answer(&session.meeting_id, "noted", now).unwrap();
            session =
                continue_meeting(&session.meeting_id, now, &registry, &git, &llm, StalenessThreshold::default(), false)
                    .unwrap();
        }
        assert_eq!(session.status, MeetingStatus::ReadyToClose);

        let outcome = close(&session.meeting_id, "confirm_sufficiency", "alice", None, now, &registry, &git, StalenessThreshold::default())
            .unwrap();
        assert!(outcome.ok, "{:?}", outcome.message);
        assert_eq!(outcome.session.status, MeetingStatus::Closed);
        assert_eq!(outcome.session.closed_decision.as_deref(), Some("confirm_sufficiency"));
    }

    #[test]
    fn close_refuses_when_question_outstanding() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        mark_repo_committee_valid("repo-a");

        let session = start(
            MeetingKind::Review,
            &Scope::repo("repo-a"),
            "v1.0.0",
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
        )
        .unwrap();

        let llm = FakeOracle::new(vec![]);
        let session =
            continue_meeting(&session.meeting_id, now, &registry, &git, &llm, StalenessThreshold::default(), false)
                .unwrap();
        assert_eq!(session.status, MeetingStatus::WaitingForAnswer);

        let outcome = close(&session.meeting_id, "confirm_sufficiency", "alice", None, now, &registry, &git, StalenessThreshold::default())
            .unwrap();
        assert!(!outcome.ok);
    }

    #[test]
    fn close_rejects_decision_not_allowed_for_kind() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let git = FakeGit::new();
        let registry = registry();
        complete_coverage(now, &git);
        mark_repo_committee_valid("repo-a");

        let session = start(
            MeetingKind::Review,
            &Scope::repo("repo-a"),
            "v1.0.0",
            now,
            &registry,
            &git,
            StalenessThreshold::default(),
        )
        .unwrap();

        let outcome = close(&session.meeting_id, "approve_intake", "alice", None, now, &registry, &git, StalenessThreshold::default())
            .unwrap();
        assert!(!outcome.ok);
    }

    #[test]
    fn bump_patch_then_minor_then_major() {
        let _home = with_isolated_home();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(bump_knowledge_version(BumpKind::Patch, now).unwrap(), "v0.0.1");
        assert_eq!(bump_knowledge_version(BumpKind::Minor, now).unwrap(), "v0.1.0");
        assert_eq!(bump_knowledge_version(BumpKind::Major, now).unwrap(), "v1.0.0");
    }

    #[test]
    fn meeting_kind_recovers_from_id_prefix() {
        assert_eq!(MeetingKind::from_meeting_id("UM-20260101_000000__system"), Some(MeetingKind::Update));
        assert_eq!(MeetingKind::from_meeting_id("RM-20260101_000000__system"), Some(MeetingKind::Review));
        assert_eq!(MeetingKind::from_meeting_id("garbage"), None);
    }
}
