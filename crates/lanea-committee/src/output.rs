//! The Committee Output validation pipeline (§4.5 "Output validation
//! pipeline"): parse → schema-validate → scope check → evidence-ref
//! membership → soft-stale marker, applied uniformly to every role's raw
//! LLM text.

use std::collections::HashSet;

use lanea_utils::types::{CommitteeOutput, Scope, Unknown};
use lanea_validation::Validate;

/// A failure at steps 1-3: there is no usable `CommitteeOutput` to derive a
/// status from. Callers terminate the whole run as `output_invalid`.
#[derive(Debug, Clone)]
pub enum HardFailure {
    ParseFailure(String),
    SchemaInvalid(Vec<String>),
    ScopeMismatch { expected: String, actual: String },
}

impl HardFailure {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ParseFailure(e) => format!("LLM output was not valid JSON: {e}"),
            Self::SchemaInvalid(errs) => {
                format!("Committee Output failed schema validation: {}", errs.join("; "))
            }
            Self::ScopeMismatch { expected, actual } => {
                format!("Committee Output scope {actual} did not match expected scope {expected}")
            }
        }
    }
}

/// The outcome of running one role's raw text through the pipeline.
#[derive(Debug, Clone)]
pub enum RoleValidation {
    /// Every step passed: no evidence_ref referenced outside the allowed set.
    Valid(CommitteeOutput),
    /// Step 4 found evidence_refs outside the allowed set (scenario S2).
    /// The output itself is not persisted as this role's claims — only the
    /// unknown refs are surfaced, as `evidence_missing` entries, to the
    /// derivation rules.
    EvidenceGap {
        output: CommitteeOutput,
        unknown_refs: Vec<String>,
    },
    Hard(HardFailure),
}

/// Run the full pipeline against one role's raw LLM text.
#[must_use]
pub fn validate_role_output(
    raw: &str,
    expected_scope: &Scope,
    allowed_evidence_ids: &HashSet<String>,
    soft_stale: bool,
) -> RoleValidation {
    // Step 1.
    let parsed: CommitteeOutput = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => return RoleValidation::Hard(HardFailure::ParseFailure(e.to_string())),
    };

    // Step 2.
    let outcome = parsed.validate();
    let Some(mut output) = outcome.normalized else {
        return RoleValidation::Hard(HardFailure::SchemaInvalid(outcome.errors));
    };

    // Step 3.
    if output.scope != *expected_scope {
        return RoleValidation::Hard(HardFailure::ScopeMismatch {
            expected: expected_scope.to_string(),
            actual: output.scope.to_string(),
        });
    }

    // Step 4.
    let mut unknown = collect_unknown_refs(&output, allowed_evidence_ids);

    // Step 5.
    if soft_stale {
        output.stale = Some(true);
        output.unknowns.push(Unknown {
            text: "knowledge for this scope is soft-stale".to_string(),
            evidence_missing: vec!["need refresh required: scope is soft-stale".to_string()],
        });
        let revalidated = output.validate();
        let Some(renormalized) = revalidated.normalized else {
            return RoleValidation::Hard(HardFailure::SchemaInvalid(revalidated.errors));
        };
        output = renormalized;
        unknown = collect_unknown_refs(&output, allowed_evidence_ids);
    }

    if unknown.is_empty() {
        RoleValidation::Valid(output)
    } else {
        unknown.sort();
        unknown.dedup();
        RoleValidation::EvidenceGap {
            output,
            unknown_refs: unknown,
        }
    }
}

fn collect_unknown_refs(output: &CommitteeOutput, allowed: &HashSet<String>) -> Vec<String> {
    let mut unknown = Vec::new();
    for fact in &output.facts {
        for r in &fact.evidence_refs {
            if !allowed.contains(r) {
                unknown.push(r.clone());
            }
        }
    }
    for edge in &output.integration_edges {
        for r in &edge.evidence_refs {
            if !allowed.contains(r) {
                unknown.push(r.clone());
            }
        }
    }
    unknown
}
