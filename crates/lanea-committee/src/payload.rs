//! Builds the LLM user payload for each committee role (§4.5 "Inputs": "a
//! user payload built from kickoff inputs if present, prior answered
//! decisions for `system` and the repo scope, repo/integration index,
//! evidence bundle"). The exact prompt wording is opaque to this core; what
//! matters is that every role sees the same shape of context.

use lanea_evidence::EvidenceBundleEntry;
use lanea_llm::Message;
use lanea_utils::types::{CommitteeOutput, CommitteeStatus, Scope};
use serde::Serialize;
use serde_json::json;

const ARCHITECT_SYSTEM_PROMPT: &str = "\
You are the architect role of a knowledge-governance committee. Given a \
pinned evidence bundle for one repository, produce a Committee Output: \
facts (each grounded in evidence_refs), assumptions and unknowns (each \
naming evidence_missing if the gap is evidentiary), integration_edges you \
can support from evidence, risks, and a verdict. Cite only evidence_ids \
present in the bundle. Respond with a single JSON object and nothing else.";

const SKEPTIC_SYSTEM_PROMPT: &str = "\
You are the skeptic role of a knowledge-governance committee, reviewing \
the architect's Committee Output against the same evidence bundle. \
Challenge unsupported facts, surface assumptions the architect missed, and \
set verdict = evidence_invalid if any architect claim lacks grounding. \
Respond with a single JSON object shaped like a Committee Output.";

const INTEGRATION_CHAIR_SYSTEM_PROMPT: &str = "\
You are the integration chair, reviewing every repository's Committee \
Status alongside the full cross-repository evidence bundle. Assert \
integration_edges between repo:<id> scopes, flag missing evidence per \
edge, and set verdict = evidence_invalid if any edge cannot be supported. \
Respond with a single JSON object shaped like a Committee Output.";

const QA_STRATEGIST_SYSTEM_PROMPT: &str = "\
You are the qa-strategist role, reviewing the full cross-repository \
evidence bundle for test-coverage and quality risks rather than \
architectural claims. Respond with a single JSON object shaped like a \
Committee Output, scoped to `system`.";

#[derive(Serialize)]
struct EvidenceEntryView<'a> {
    evidence_id: &'a str,
    file_path: &'a str,
    commit_sha: &'a str,
    start_line: u32,
    end_line: u32,
    excerpt: &'a str,
}

fn evidence_view(bundle: &[EvidenceBundleEntry]) -> Vec<EvidenceEntryView<'_>> {
    bundle
        .iter()
        .map(|e| EvidenceEntryView {
            evidence_id: &e.evidence_id,
            file_path: e.file_path.as_str(),
            commit_sha: &e.commit_sha,
            start_line: e.start_line,
            end_line: e.end_line,
            excerpt: &e.excerpt,
        })
        .collect()
}

/// Build the architect's input messages.
#[must_use]
pub fn architect_messages(
    scope: &Scope,
    evidence_bundle: &[EvidenceBundleEntry],
    prior_decisions: &[String],
) -> Vec<Message> {
    let payload = json!({
        "scope": scope.as_str(),
        "evidence": evidence_view(evidence_bundle),
        "prior_decisions": prior_decisions,
    });
    vec![
        Message::system(ARCHITECT_SYSTEM_PROMPT),
        Message::user(payload.to_string()),
    ]
}

/// Build the skeptic's input messages. The skeptic's payload additionally
/// carries the architect's own output, since the two roles run strictly
/// in sequence (§4.5 "repo (architect then skeptic)").
#[must_use]
pub fn skeptic_messages(
    scope: &Scope,
    evidence_bundle: &[EvidenceBundleEntry],
    prior_decisions: &[String],
    architect_output: &CommitteeOutput,
) -> Vec<Message> {
    let payload = json!({
        "scope": scope.as_str(),
        "evidence": evidence_view(evidence_bundle),
        "prior_decisions": prior_decisions,
        "architect_output": architect_output,
    });
    vec![
        Message::system(SKEPTIC_SYSTEM_PROMPT),
        Message::user(payload.to_string()),
    ]
}

/// Build the integration chair's input messages: every in-scope repo's
/// committee status, plus the union of their evidence bundles.
#[must_use]
pub fn integration_chair_messages(
    repo_statuses: &[(String, CommitteeStatus)],
    evidence_bundle: &[EvidenceBundleEntry],
    prior_decisions: &[String],
) -> Vec<Message> {
    let payload = json!({
        "scope": Scope::system().as_str(),
        "repo_statuses": repo_statuses,
        "evidence": evidence_view(evidence_bundle),
        "prior_decisions": prior_decisions,
    });
    vec![
        Message::system(INTEGRATION_CHAIR_SYSTEM_PROMPT),
        Message::user(payload.to_string()),
    ]
}

/// Build the qa-strategist's input messages (§4.5 "qa-strategist (single
/// role)" — minimally specified, so this mirrors the integration chair's
/// shape of evidence access without the repo-status input; see
/// `DESIGN.md` for the Open Question resolution).
#[must_use]
pub fn qa_strategist_messages(
    evidence_bundle: &[EvidenceBundleEntry],
    prior_decisions: &[String],
) -> Vec<Message> {
    let payload = json!({
        "scope": Scope::system().as_str(),
        "evidence": evidence_view(evidence_bundle),
        "prior_decisions": prior_decisions,
    });
    vec![
        Message::system(QA_STRATEGIST_SYSTEM_PROMPT),
        Message::user(payload.to_string()),
    ]
}
