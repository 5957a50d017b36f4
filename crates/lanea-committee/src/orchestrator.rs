//! Per-repo, integration, and qa-strategist committee runs (§4.5), plus a
//! bounded-concurrency dispatcher for running multiple repo committees at
//! once.

use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;

use lanea_git::GitSurface;
use lanea_llm::LlmOracle;
use lanea_staleness::{evaluate_repo_staleness, evaluate_scope_staleness, StalenessThreshold};
use lanea_utils::atomic_write::write_file_atomic;
use lanea_utils::canonicalization::emit_jcs;
use lanea_utils::jsonl::read_json_opt;
use lanea_utils::paths::{
    architect_claims_error_path, architect_claims_md_path, architect_claims_path, decisions_dir,
    integration_findings_error_path, integration_findings_md_path, integration_findings_path,
    integration_status_path, qa_strategist_findings_error_path, qa_strategist_findings_md_path,
    qa_strategist_findings_path, repo_committee_status_error_path, repo_committee_status_path,
    skeptic_challenges_error_path, skeptic_challenges_md_path, skeptic_challenges_path,
};
use lanea_utils::types::{
    CommitteeOutput, CommitteeStatus, DecisionPacket, DecisionPacketStatus, RepositoryRegistry, Scope,
};

use crate::derive;
use crate::output::{self, RoleValidation};
use crate::payload;
use crate::types::{CommitteeRole, IntegrationCommitteeOutcome, QaStrategistOutcome, RepoCommitteeOutcome, RunState};

fn repo_outcome(repo_id: &str, state: RunState, ok: bool, reason_code: Option<&str>, message: impl Into<String>) -> RepoCommitteeOutcome {
    RepoCommitteeOutcome {
        repo_id: repo_id.to_string(),
        state,
        ok,
        reason_code: reason_code.map(str::to_string),
        message: Some(message.into()),
        status: None,
    }
}

fn missing_input(repo_id: &str, message: impl Into<String>) -> RepoCommitteeOutcome {
    repo_outcome(repo_id, RunState::MissingInput, false, Some("MISSING_INPUT"), message)
}

fn llm_error(repo_id: &str, message: impl Into<String>) -> RepoCommitteeOutcome {
    repo_outcome(repo_id, RunState::LlmError, false, Some("LLM_ERROR"), message)
}

fn output_invalid(repo_id: &str, message: impl Into<String>) -> RepoCommitteeOutcome {
    repo_outcome(repo_id, RunState::OutputInvalid, false, Some("OUTPUT_INVALID"), message)
}

/// Collect prior answered Decision Packets for `system` and (if not
/// already `system`) `scope`, rendered as short context strings (§4.5
/// "Inputs": "prior answered decisions for `system` and the repo scope").
fn answered_decision_texts(scope: &Scope) -> Result<Vec<String>> {
    let mut scopes = vec![Scope::system()];
    if *scope != Scope::system() {
        scopes.push(scope.clone());
    }

    let dir = decisions_dir();
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = std::fs::read_dir(dir.as_std_path())
        .with_context(|| format!("reading {dir}"))?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.ends_with(".json"))
        .collect();
    names.sort();

    let mut texts = Vec::new();
    for name in names {
        let path = dir.join(&name);
        if let Some(packet) = read_json_opt::<DecisionPacket>(&path)? {
            if matches!(packet.status, DecisionPacketStatus::Answered) && scopes.contains(&packet.scope) {
                texts.push(format!("{}: {}", packet.decision_id, packet.context.summary));
            }
        }
    }
    Ok(texts)
}

fn render_output_markdown(role_label: &str, output: &CommitteeOutput) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {role_label}: {}\n\n", output.scope));
    out.push_str(&format!("- verdict: `{:?}`\n", output.verdict));
    if let Some(stale) = output.stale {
        out.push_str(&format!("- stale: {stale}\n"));
    }
    out.push('\n');
    out.push_str(&format!("## Facts ({})\n\n", output.facts.len()));
    for f in &output.facts {
        out.push_str(&format!("- {} _(evidence: {})_\n", f.text, f.evidence_refs.join(", ")));
    }
    out.push_str(&format!("\n## Assumptions ({})\n\n", output.assumptions.len()));
    for a in &output.assumptions {
        out.push_str(&format!("- {}\n", a.text));
    }
    out.push_str(&format!("\n## Unknowns ({})\n\n", output.unknowns.len()));
    for u in &output.unknowns {
        out.push_str(&format!("- {}\n", u.text));
    }
    out.push_str(&format!("\n## Integration edges ({})\n\n", output.integration_edges.len()));
    for e in &output.integration_edges {
        out.push_str(&format!("- {} -> {} ({})\n", e.from, e.to, e.edge_type));
    }
    out.push_str(&format!("\n## Risks ({})\n\n", output.risks.len()));
    for r in &output.risks {
        out.push_str(&format!("- [{:?}] {}\n", r.severity, r.text));
    }
    out
}

fn write_error_artifact(path: &camino::Utf8Path, message: &str, now_label: &str) -> Result<()> {
    let json = emit_jcs(&serde_json::json!({ "error": message, "at": now_label })).context("canonicalizing error artifact")?;
    write_file_atomic(path, &json).with_context(|| format!("writing {path}"))?;
    Ok(())
}

fn remove_if_exists(path: &camino::Utf8Path) -> Result<()> {
    if path.as_std_path().exists() {
        std::fs::remove_file(path.as_std_path()).with_context(|| format!("removing {path}"))?;
    }
    Ok(())
}

fn persist_role_success(role: CommitteeRole, repo_id: &str, output: &CommitteeOutput) -> Result<()> {
    let (json_path, md_path, error_path) = match role {
        CommitteeRole::Architect => (
            architect_claims_path(repo_id),
            architect_claims_md_path(repo_id),
            architect_claims_error_path(repo_id),
        ),
        CommitteeRole::Skeptic => (
            skeptic_challenges_path(repo_id),
            skeptic_challenges_md_path(repo_id),
            skeptic_challenges_error_path(repo_id),
        ),
        CommitteeRole::IntegrationChair | CommitteeRole::QaStrategist => unreachable!("repo-scoped role only"),
    };

    let json = emit_jcs(output).with_context(|| format!("canonicalizing {} output for {repo_id}", role.label()))?;
    write_file_atomic(&json_path, &json).with_context(|| format!("writing {json_path}"))?;
    write_file_atomic(&md_path, &render_output_markdown(role.label(), output)).with_context(|| format!("writing {md_path}"))?;
    remove_if_exists(&error_path)?;
    Ok(())
}

fn persist_role_error(role: CommitteeRole, repo_id: &str, message: &str, now: DateTime<Utc>) -> Result<()> {
    let (json_path, md_path, error_path) = match role {
        CommitteeRole::Architect => (
            architect_claims_path(repo_id),
            architect_claims_md_path(repo_id),
            architect_claims_error_path(repo_id),
        ),
        CommitteeRole::Skeptic => (
            skeptic_challenges_path(repo_id),
            skeptic_challenges_md_path(repo_id),
            skeptic_challenges_error_path(repo_id),
        ),
        CommitteeRole::IntegrationChair | CommitteeRole::QaStrategist => unreachable!("repo-scoped role only"),
    };
    remove_if_exists(&json_path)?;
    remove_if_exists(&md_path)?;
    write_error_artifact(&error_path, message, &now.to_rfc3339())
}

fn persist_status(repo_id: &str, status: &CommitteeStatus) -> Result<()> {
    let path = repo_committee_status_path(repo_id);
    let json = emit_jcs(status).context("canonicalizing committee status")?;
    write_file_atomic(&path, &json).with_context(|| format!("writing {path}"))?;
    remove_if_exists(&repo_committee_status_error_path(repo_id))?;
    Ok(())
}

/// Run one repo committee: architect then skeptic, strictly sequential,
/// hard-stale refusal checked first (§4.5).
pub fn run_repo_committee(
    repo_id: &str,
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    llm: &dyn LlmOracle,
    threshold: StalenessThreshold,
    force: bool,
) -> Result<RepoCommitteeOutcome> {
    if registry.resolve_repo_path(repo_id).is_none() {
        return Ok(missing_input(repo_id, format!("{repo_id} not found in repository registry")));
    }

    let scope = Scope::repo(repo_id);
    let staleness = evaluate_repo_staleness(repo_id, now, registry, git, threshold)
        .with_context(|| format!("evaluating staleness for {repo_id}"))?;

    if staleness.hard_stale && !force {
        lanea_packet::ensure_refresh_required_packet(
            &scope,
            &staleness.reasons,
            staleness.repo_head_sha.as_deref(),
            staleness.last_scanned_head_sha.as_deref(),
            staleness.last_scan_time,
            staleness.last_merge_event_time,
            now,
        )
        .context("writing refresh-required decision packet")?;
        return Ok(repo_outcome(
            repo_id,
            RunState::StaleBlocked,
            false,
            Some("STALE_BLOCKED"),
            "scope is hard-stale; refresh required before committee work resumes",
        ));
    }

    let refs = match lanea_evidence::load_evidence_refs(repo_id) {
        Ok(refs) => refs,
        Err(e) => return Ok(missing_input(repo_id, format!("loading evidence refs: {e}"))),
    };
    let bundle = match lanea_evidence::build_evidence_bundle(&refs, registry, git) {
        Ok(b) => b,
        Err(e) => return Ok(missing_input(repo_id, format!("building evidence bundle: {e}"))),
    };
    let allowed: HashSet<String> = refs.iter().map(|r| r.evidence_id.clone()).collect();
    let prior_decisions = answered_decision_texts(&scope)?;
    let soft_stale = staleness.stale && !staleness.hard_stale;

    let architect_messages = payload::architect_messages(&scope, &bundle, &prior_decisions);
    let architect_raw = match llm.invoke(&architect_messages) {
        Ok(text) => text,
        Err(e) => return Ok(llm_error(repo_id, format!("architect invocation failed: {e}"))),
    };
    let architect_validation = output::validate_role_output(&architect_raw, &scope, &allowed, soft_stale);

    let (architect_contribution, architect_output_for_skeptic) = match architect_validation {
        RoleValidation::Valid(out) => {
            persist_role_success(CommitteeRole::Architect, repo_id, &out)?;
            (derive::RoleContribution::from_output(&out), out)
        }
        RoleValidation::EvidenceGap { output: out, unknown_refs } => {
            persist_role_error(
                CommitteeRole::Architect,
                repo_id,
                &format!("unknown evidence refs: {}", unknown_refs.join(", ")),
                now,
            )?;
            (derive::RoleContribution::from_evidence_gap(&unknown_refs), out)
        }
        RoleValidation::Hard(failure) => {
            persist_role_error(CommitteeRole::Architect, repo_id, &failure.message(), now)?;
            return Ok(output_invalid(repo_id, failure.message()));
        }
    };

    let skeptic_messages = payload::skeptic_messages(&scope, &bundle, &prior_decisions, &architect_output_for_skeptic);
    let skeptic_raw = match llm.invoke(&skeptic_messages) {
        Ok(text) => text,
        Err(e) => return Ok(llm_error(repo_id, format!("skeptic invocation failed: {e}"))),
    };
    let skeptic_validation = output::validate_role_output(&skeptic_raw, &scope, &allowed, soft_stale);

    let skeptic_contribution = match skeptic_validation {
        RoleValidation::Valid(out) => {
            persist_role_success(CommitteeRole::Skeptic, repo_id, &out)?;
            derive::RoleContribution::from_output(&out)
        }
        RoleValidation::EvidenceGap { unknown_refs, .. } => {
            persist_role_error(
                CommitteeRole::Skeptic,
                repo_id,
                &format!("unknown evidence refs: {}", unknown_refs.join(", ")),
                now,
            )?;
            derive::RoleContribution::from_evidence_gap(&unknown_refs)
        }
        RoleValidation::Hard(failure) => {
            persist_role_error(CommitteeRole::Skeptic, repo_id, &failure.message(), now)?;
            return Ok(output_invalid(repo_id, failure.message()));
        }
    };

    let mut status = derive::derive_committee_status(repo_id, &[architect_contribution, skeptic_contribution]);
    status.stale = Some(staleness.stale);
    status.hard_stale = Some(staleness.hard_stale);
    status.staleness = Some(staleness);

    persist_status(repo_id, &status)?;

    let state = if status.evidence_valid {
        RunState::EvidenceValid
    } else {
        RunState::EvidenceInvalid
    };
    Ok(RepoCommitteeOutcome {
        repo_id: repo_id.to_string(),
        state,
        ok: true,
        reason_code: None,
        message: None,
        status: Some(status),
    })
}

/// Run repo committees for every id in `repo_ids` at a bounded pool
/// (default `min(8, cpu_count)`, never more than `repo_ids.len()`; §4.5
/// "Concurrency").
pub fn run_repo_committees(
    repo_ids: &[String],
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    llm: &dyn LlmOracle,
    threshold: StalenessThreshold,
    force: bool,
) -> Result<Vec<RepoCommitteeOutcome>> {
    if repo_ids.is_empty() {
        return Ok(Vec::new());
    }

    let cpu_count = std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1);
    let pool_size = repo_ids.len().min(8).min(cpu_count).max(1);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size)
        .build()
        .context("building bounded committee thread pool")?;

    pool.install(|| {
        repo_ids
            .par_iter()
            .map(|repo_id| run_repo_committee(repo_id, now, registry, git, llm, threshold, force))
            .collect::<Result<Vec<_>>>()
    })
}

/// Run the integration chair. Refuses with `MissingInput` unless every
/// in-scope repo already has a valid `CommitteeStatus` on disk (§4.5 "the
/// integration chair runs only after all in-scope repo committees are
/// valid").
pub fn run_integration_committee(
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    llm: &dyn LlmOracle,
    threshold: StalenessThreshold,
    force: bool,
) -> Result<IntegrationCommitteeOutcome> {
    let repo_ids = registry.active_repo_ids();
    let mut repo_statuses = Vec::new();
    for repo_id in &repo_ids {
        match read_json_opt::<CommitteeStatus>(&repo_committee_status_path(repo_id))? {
            Some(status) if status.evidence_valid => repo_statuses.push((repo_id.to_string(), status)),
            _ => {
                return Ok(IntegrationCommitteeOutcome {
                    state: RunState::MissingInput,
                    ok: false,
                    reason_code: Some("REPO_COMMITTEES_NOT_READY".to_string()),
                    message: Some(format!("{repo_id} does not have a valid committee status yet")),
                    status: None,
                });
            }
        }
    }

    let scope = Scope::system();
    let staleness = evaluate_scope_staleness(&scope, now, registry, git, threshold)
        .context("evaluating system-scope staleness")?;

    if staleness.hard_stale && !force {
        lanea_packet::ensure_refresh_required_packet(
            &scope,
            &staleness.reasons,
            None,
            None,
            None,
            None,
            now,
        )
        .context("writing refresh-required decision packet")?;
        return Ok(IntegrationCommitteeOutcome {
            state: RunState::StaleBlocked,
            ok: false,
            reason_code: Some("STALE_BLOCKED".to_string()),
            message: Some("system scope is hard-stale; refresh required before committee work resumes".to_string()),
            status: None,
        });
    }

    let mut allowed = HashSet::new();
    let mut bundle = Vec::new();
    for repo_id in &repo_ids {
        let refs = lanea_evidence::load_evidence_refs(repo_id)
            .with_context(|| format!("loading evidence refs for {repo_id}"))?;
        allowed.extend(refs.iter().map(|r| r.evidence_id.clone()));
        bundle.extend(
            lanea_evidence::build_evidence_bundle(&refs, registry, git)
                .with_context(|| format!("building evidence bundle for {repo_id}"))?,
        );
    }

    let prior_decisions = answered_decision_texts(&scope)?;
    let messages = payload::integration_chair_messages(&repo_statuses, &bundle, &prior_decisions);
    let raw = match llm.invoke(&messages) {
        Ok(text) => text,
        Err(e) => {
            return Ok(IntegrationCommitteeOutcome {
                state: RunState::LlmError,
                ok: false,
                reason_code: Some("LLM_ERROR".to_string()),
                message: Some(format!("integration chair invocation failed: {e}")),
                status: None,
            })
        }
    };

    let soft_stale = staleness.stale && !staleness.hard_stale;
    let validation = output::validate_role_output(&raw, &scope, &allowed, soft_stale);

    match validation {
        RoleValidation::Valid(out) => {
            persist_integration_success(&out)?;
            let status = derive::derive_integration_status(&out);
            persist_integration_status(&status)?;
            let state = if status.evidence_valid {
                RunState::EvidenceValid
            } else {
                RunState::EvidenceInvalid
            };
            Ok(IntegrationCommitteeOutcome {
                state,
                ok: true,
                reason_code: None,
                message: None,
                status: Some(status),
            })
        }
        RoleValidation::EvidenceGap { unknown_refs, .. } => {
            persist_integration_error(&format!("unknown evidence refs: {}", unknown_refs.join(", ")), now)?;
            let status = derive::integration_status_from_unknown_refs(&unknown_refs);
            persist_integration_status(&status)?;
            Ok(IntegrationCommitteeOutcome {
                state: RunState::EvidenceInvalid,
                ok: true,
                reason_code: None,
                message: None,
                status: Some(status),
            })
        }
        RoleValidation::Hard(failure) => {
            persist_integration_error(&failure.message(), now)?;
            Ok(IntegrationCommitteeOutcome {
                state: RunState::OutputInvalid,
                ok: false,
                reason_code: Some("OUTPUT_INVALID".to_string()),
                message: Some(failure.message()),
                status: None,
            })
        }
    }
}

fn persist_integration_success(output: &CommitteeOutput) -> Result<()> {
    let json = emit_jcs(output).context("canonicalizing integration findings")?;
    write_file_atomic(&integration_findings_path(), &json).context("writing integration findings")?;
    write_file_atomic(
        &integration_findings_md_path(),
        &render_output_markdown("integration_chair", output),
    )
    .context("writing integration findings markdown")?;
    remove_if_exists(&integration_findings_error_path())?;
    Ok(())
}

fn persist_integration_error(message: &str, now: DateTime<Utc>) -> Result<()> {
    remove_if_exists(&integration_findings_path())?;
    remove_if_exists(&integration_findings_md_path())?;
    write_error_artifact(&integration_findings_error_path(), message, &now.to_rfc3339())
}

fn persist_integration_status(status: &lanea_utils::types::IntegrationStatus) -> Result<()> {
    let json = emit_jcs(status).context("canonicalizing integration status")?;
    write_file_atomic(&integration_status_path(), &json).context("writing integration status")?;
    Ok(())
}

/// Run the qa-strategist, a single role with no derived status (§4.5 names
/// this mode but specifies no derivation rule or hard-stale gate for it;
/// see `DESIGN.md` for the Open Question resolution this follows).
pub fn run_qa_strategist(
    now: DateTime<Utc>,
    registry: &RepositoryRegistry,
    git: &dyn GitSurface,
    llm: &dyn LlmOracle,
) -> Result<QaStrategistOutcome> {
    let scope = Scope::system();
    let mut allowed = HashSet::new();
    let mut bundle = Vec::new();
    for repo_id in registry.active_repo_ids() {
        let refs = lanea_evidence::load_evidence_refs(repo_id)
            .with_context(|| format!("loading evidence refs for {repo_id}"))?;
        allowed.extend(refs.iter().map(|r| r.evidence_id.clone()));
        bundle.extend(
            lanea_evidence::build_evidence_bundle(&refs, registry, git)
                .with_context(|| format!("building evidence bundle for {repo_id}"))?,
        );
    }

    let prior_decisions = answered_decision_texts(&scope)?;
    let messages = payload::qa_strategist_messages(&bundle, &prior_decisions);
    let raw = match llm.invoke(&messages) {
        Ok(text) => text,
        Err(e) => {
            return Ok(QaStrategistOutcome {
                state: RunState::LlmError,
                ok: false,
                reason_code: Some("LLM_ERROR".to_string()),
                message: Some(format!("qa-strategist invocation failed: {e}")),
                evidence_valid: None,
            })
        }
    };

    match output::validate_role_output(&raw, &scope, &allowed, false) {
        RoleValidation::Valid(out) => {
            let evidence_valid = matches!(out.verdict, lanea_utils::types::CommitteeVerdict::EvidenceValid);
            let json = emit_jcs(&out).context("canonicalizing qa-strategist findings")?;
            write_file_atomic(&qa_strategist_findings_path(), &json).context("writing qa-strategist findings")?;
            write_file_atomic(
                &qa_strategist_findings_md_path(),
                &render_output_markdown("qa_strategist", &out),
            )
            .context("writing qa-strategist findings markdown")?;
            remove_if_exists(&qa_strategist_findings_error_path())?;
            Ok(QaStrategistOutcome {
                state: if evidence_valid { RunState::EvidenceValid } else { RunState::EvidenceInvalid },
                ok: true,
                reason_code: None,
                message: None,
                evidence_valid: Some(evidence_valid),
            })
        }
        RoleValidation::EvidenceGap { unknown_refs, .. } => {
            remove_if_exists(&qa_strategist_findings_path())?;
            remove_if_exists(&qa_strategist_findings_md_path())?;
            write_error_artifact(
                &qa_strategist_findings_error_path(),
                &format!("unknown evidence refs: {}", unknown_refs.join(", ")),
                &now.to_rfc3339(),
            )?;
            Ok(QaStrategistOutcome {
                state: RunState::EvidenceInvalid,
                ok: true,
                reason_code: None,
                message: None,
                evidence_valid: Some(false),
            })
        }
        RoleValidation::Hard(failure) => {
            remove_if_exists(&qa_strategist_findings_path())?;
            remove_if_exists(&qa_strategist_findings_md_path())?;
            write_error_artifact(&qa_strategist_findings_error_path(), &failure.message(), &now.to_rfc3339())?;
            Ok(QaStrategistOutcome {
                state: RunState::OutputInvalid,
                ok: false,
                reason_code: Some("OUTPUT_INVALID".to_string()),
                message: Some(failure.message()),
                evidence_valid: None,
            })
        }
    }
}
