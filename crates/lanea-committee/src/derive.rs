//! Deterministic derivation rules: per-role contributions to a
//! [`CommitteeStatus`], and an integration chair's [`CommitteeOutput`] to
//! an [`IntegrationStatus`] (§4.5 "Derivation rules").

use lanea_utils::types::{
    BlockingIssue, CommitteeOutput, CommitteeStatus, CommitteeVerdict, Confidence, IntegrationGap,
    IntegrationStatus, NextAction, Severity,
};

/// One role's contribution to the combined blocking-issue pool: its
/// verdict plus the `evidence_missing` entries on its assumptions,
/// unknowns and integration_edges — or, for a role whose output failed
/// evidence-ref membership (step 4), the unknown refs themselves standing
/// in for `evidence_missing` (scenario S2: the role's claims are never
/// persisted, but the gap still drives `next_action`/`confidence`).
pub struct RoleContribution {
    pub verdict: Option<CommitteeVerdict>,
    pub evidence_missing: Vec<String>,
}

impl RoleContribution {
    #[must_use]
    pub fn from_output(output: &CommitteeOutput) -> Self {
        let mut evidence_missing = Vec::new();
        for a in &output.assumptions {
            evidence_missing.extend(a.evidence_missing.iter().cloned());
        }
        for u in &output.unknowns {
            evidence_missing.extend(u.evidence_missing.iter().cloned());
        }
        for e in &output.integration_edges {
            evidence_missing.extend(e.evidence_missing.iter().cloned());
        }
        Self {
            verdict: Some(output.verdict),
            evidence_missing,
        }
    }

    #[must_use]
    pub fn from_evidence_gap(unknown_refs: &[String]) -> Self {
        Self {
            verdict: None,
            evidence_missing: unknown_refs.to_vec(),
        }
    }
}

/// Derive a repo [`CommitteeStatus`] from the architect's and skeptic's
/// contributions (§4.5 "Derivation rules (repo committee status)").
#[must_use]
pub fn derive_committee_status(repo_id: &str, contributions: &[RoleContribution]) -> CommitteeStatus {
    let mut missing: Vec<String> = contributions
        .iter()
        .flat_map(|c| c.evidence_missing.iter().cloned())
        .collect();
    missing.sort();
    missing.dedup();

    let mut blocking_issues: Vec<BlockingIssue> = missing
        .iter()
        .enumerate()
        .map(|(i, entry)| BlockingIssue {
            id: format!("evidence-missing-{i:03}"),
            description: format!("evidence missing: {entry}"),
            evidence_missing: vec![entry.clone()],
            severity: Severity::Medium,
        })
        .collect();

    let invalid_roles = contributions
        .iter()
        .filter(|c| !matches!(c.verdict, Some(CommitteeVerdict::EvidenceValid)))
        .count();
    for i in 0..invalid_roles {
        blocking_issues.push(BlockingIssue {
            id: format!("verdict-invalid-{i:03}"),
            description: "a committee role did not report evidence_valid".to_string(),
            evidence_missing: Vec::new(),
            severity: Severity::High,
        });
    }

    let has_high = blocking_issues.iter().any(|b| b.severity == Severity::High);
    let has_missing = blocking_issues
        .iter()
        .any(|b| b.severity == Severity::Medium && !b.evidence_missing.is_empty());

    let evidence_valid = !(has_high || has_missing);
    let next_action = if has_missing {
        NextAction::RescanNeeded
    } else if has_high {
        NextAction::DecisionNeeded
    } else {
        NextAction::Proceed
    };
    let confidence = if evidence_valid {
        Confidence::High
    } else if has_missing {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    blocking_issues.sort_by(|a, b| a.id.cmp(&b.id));

    CommitteeStatus {
        repo_id: Some(repo_id.to_string()),
        evidence_valid,
        blocking_issues,
        confidence,
        next_action,
        degraded: None,
        degraded_reason: None,
        stale: None,
        hard_stale: None,
        staleness: None,
    }
}

/// Derive an [`IntegrationStatus`] from the integration chair's validated
/// output (§4.5 "Derivation rules (integration status)").
#[must_use]
pub fn derive_integration_status(output: &CommitteeOutput) -> IntegrationStatus {
    let mut gaps = Vec::new();
    for (i, edge) in output.integration_edges.iter().enumerate() {
        if edge.evidence_missing.is_empty() {
            continue;
        }
        let from_is_repo = edge.from.starts_with("repo:");
        let to_is_repo = edge.to.starts_with("repo:");
        if !(from_is_repo && to_is_repo) {
            continue;
        }
        let severity = if edge.confidence < 0.35 {
            Severity::High
        } else if edge.confidence < 0.60 {
            Severity::Medium
        } else {
            Severity::Low
        };
        gaps.push(IntegrationGap {
            id: format!("integration-gap-{i:03}"),
            repos: vec![edge.from.clone(), edge.to.clone()],
            description: format!("integration edge {}->{} is missing evidence", edge.from, edge.to),
            evidence_refs: edge.evidence_refs.clone(),
            evidence_missing: edge.evidence_missing.clone(),
            severity,
        });
    }
    gaps.sort_by(|a, b| a.id.cmp(&b.id));

    let any_high_gap = gaps.iter().any(|g| g.severity == Severity::High);
    let decision_needed = !matches!(output.verdict, CommitteeVerdict::EvidenceValid)
        || !gaps.is_empty()
        || !output.assumptions.is_empty()
        || !output.unknowns.is_empty();
    let evidence_valid = matches!(output.verdict, CommitteeVerdict::EvidenceValid) && !any_high_gap;

    IntegrationStatus {
        evidence_valid,
        integration_gaps: gaps,
        decision_needed,
    }
}

/// Derive an [`IntegrationStatus`] for the case where the chair's own
/// output failed evidence-ref membership (step 4): one medium-severity gap
/// per unique unknown ref, mirroring `RoleContribution::from_evidence_gap`
/// for the repo-committee case.
#[must_use]
pub fn integration_status_from_unknown_refs(unknown_refs: &[String]) -> IntegrationStatus {
    let mut gaps: Vec<IntegrationGap> = unknown_refs
        .iter()
        .enumerate()
        .map(|(i, entry)| IntegrationGap {
            id: format!("integration-gap-{i:03}"),
            repos: Vec::new(),
            description: format!("evidence ref not in allowed set: {entry}"),
            evidence_refs: Vec::new(),
            evidence_missing: vec![entry.clone()],
            severity: Severity::Medium,
        })
        .collect();
    gaps.sort_by(|a, b| a.id.cmp(&b.id));

    IntegrationStatus {
        evidence_valid: false,
        integration_gaps: gaps,
        decision_needed: true,
    }
}
