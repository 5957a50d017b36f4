//! Decision Packets (§4.9): structured human-escalation records written
//! whenever automation refuses to proceed on its own (hard-stale refusal,
//! a meeting's `approve_intake` refusal, and similar blocking conditions).
//!
//! Creation is idempotent per `(kind, scope)`: a packet's `decision_id` is
//! derived deterministically by hashing `scope ∥ blocking_state ∥ kind`, and
//! `ensure_open_packet` scans `<knowledge>/decisions/` for an already-open
//! packet with the same `kind`/`scope` prefix before writing a new one.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use lanea_utils::atomic_write::write_file_atomic;
use lanea_utils::canonicalization::emit_jcs;
use lanea_utils::jsonl::read_json_opt;
use lanea_utils::paths::{decision_packet_md_path, decision_packet_path, decisions_dir};
use lanea_utils::types::{DecisionContext, DecisionPacket, DecisionPacketStatus, DecisionQuestion, Scope};
use lanea_validation::Validate;

/// The kind used for the refresh-required packet a hard-stale refusal
/// writes (§4.5, §4.9, scenario S3).
pub const REFRESH_REQUIRED_KIND: &str = "refresh-required";

fn scope_slug(scope: &Scope) -> String {
    scope.as_str().replace(':', "-")
}

fn decision_id_for(scope: &Scope, blocking_state: &str, kind: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(scope.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(blocking_state.as_bytes());
    hasher.update(b"\0");
    hasher.update(kind.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Filename stem shared by a packet's `.json`/`.md` pair, e.g.
/// `refresh-required-repo-a-3f9c1a2b4d5e6f70`.
fn filename_stem(kind: &str, scope: &Scope, decision_id: &str) -> String {
    let short = &decision_id[..16.min(decision_id.len())];
    format!("{kind}-{}-{short}", scope_slug(scope))
}

fn filename_prefix(kind: &str, scope: &Scope) -> String {
    format!("DECISION-{kind}-{}-", scope_slug(scope))
}

/// Find an already-open packet for `(kind, scope)`, if one exists. Multiple
/// matches (there should never be more than one, per §8's "at most one open
/// refresh-required Decision Packet per scope" invariant) return the
/// lexicographically first.
pub fn find_open_packet(kind: &str, scope: &Scope) -> Result<Option<DecisionPacket>> {
    let dir = decisions_dir();
    if !dir.as_std_path().is_dir() {
        return Ok(None);
    }
    let prefix = filename_prefix(kind, scope);
    let mut names: Vec<String> = std::fs::read_dir(dir.as_std_path())
        .with_context(|| format!("reading {dir}"))?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.starts_with(&prefix) && n.ends_with(".json"))
        .collect();
    names.sort();

    for name in names {
        let path = dir.join(&name);
        if let Some(packet) = read_json_opt::<DecisionPacket>(&path)? {
            if matches!(packet.status, DecisionPacketStatus::Open) {
                return Ok(Some(packet));
            }
        }
    }
    Ok(None)
}

/// List every currently-open packet for `scope`, regardless of `kind`. Used
/// by the Sufficiency Ledger's approve gate ("any open decision packet for
/// scope ⇒ refuse", §4.6).
pub fn list_open_packets_for_scope(scope: &Scope) -> Result<Vec<DecisionPacket>> {
    let dir = decisions_dir();
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir.as_std_path()).with_context(|| format!("reading {dir}"))? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(".json") {
            continue;
        }
        let path = dir.join(&name);
        if let Some(packet) = read_json_opt::<DecisionPacket>(&path)? {
            if packet.scope == *scope && matches!(packet.status, DecisionPacketStatus::Open) {
                out.push(packet);
            }
        }
    }
    out.sort_by(|a, b| a.decision_id.cmp(&b.decision_id));
    Ok(out)
}

fn persist(kind: &str, packet: &DecisionPacket) -> Result<()> {
    let stem = filename_stem(kind, &packet.scope, &packet.decision_id);
    let json_path = decision_packet_path(&stem);
    let md_path = decision_packet_md_path(&stem);

    let json = emit_jcs(packet).context("canonicalizing decision packet")?;
    write_file_atomic(&json_path, &json).with_context(|| format!("writing {json_path}"))?;

    let md = render_markdown(packet);
    write_file_atomic(&md_path, &md).with_context(|| format!("writing {md_path}"))?;
    Ok(())
}

fn render_markdown(packet: &DecisionPacket) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Decision: {}\n\n", packet.decision_id));
    out.push_str(&format!("- scope: `{}`\n", packet.scope));
    out.push_str(&format!("- trigger: {}\n", packet.trigger));
    out.push_str(&format!("- blocking_state: {}\n", packet.blocking_state));
    out.push_str(&format!("- status: {:?}\n", packet.status));
    out.push_str(&format!("- created_at: {}\n", packet.created_at.to_rfc3339()));
    if let Some(answered_at) = packet.answered_at {
        out.push_str(&format!("- answered_at: {}\n", answered_at.to_rfc3339()));
    }
    out.push('\n');
    out.push_str("## Context\n\n");
    out.push_str(&packet.context.summary);
    out.push_str("\n\n");
    out.push_str(&format!("Why automation failed: {}\n\n", packet.context.why_automation_failed));
    if !packet.context.what_is_known.is_empty() {
        out.push_str("What is known:\n\n");
        for item in &packet.context.what_is_known {
            out.push_str(&format!("- {item}\n"));
        }
        out.push('\n');
    }
    out.push_str("## Questions\n\n");
    for q in &packet.questions {
        out.push_str(&format!("- `{}` ({}): {}\n", q.id, q.expected_answer_type, q.question));
        if !q.constraints.is_empty() {
            out.push_str(&format!("  - constraints: {}\n", q.constraints.join(", ")));
        }
    }
    if !packet.assumptions_if_unanswered.is_empty() {
        out.push_str("\n## Assumptions if left unanswered\n\n");
        for a in &packet.assumptions_if_unanswered {
            out.push_str(&format!("- {a}\n"));
        }
    }
    out
}

/// Ensure exactly one open packet exists for `(kind, scope)`. If one is
/// already open, it is returned unchanged (no write happens). Otherwise a
/// new packet is built from the supplied context/questions, validated, and
/// persisted as a JSON/Markdown sibling pair.
#[allow(clippy::too_many_arguments)]
pub fn ensure_open_packet(
    kind: &str,
    scope: &Scope,
    trigger: &str,
    blocking_state: &str,
    context: DecisionContext,
    questions: Vec<DecisionQuestion>,
    assumptions_if_unanswered: Vec<String>,
    now: DateTime<Utc>,
) -> Result<DecisionPacket> {
    if let Some(existing) = find_open_packet(kind, scope)? {
        return Ok(existing);
    }

    let decision_id = decision_id_for(scope, blocking_state, kind);
    let packet = DecisionPacket {
        decision_id,
        scope: scope.clone(),
        trigger: trigger.to_string(),
        blocking_state: blocking_state.to_string(),
        context,
        questions,
        assumptions_if_unanswered,
        created_at: now,
        status: DecisionPacketStatus::Open,
        answered_at: None,
    };

    let outcome = packet.validate();
    if !outcome.ok {
        bail!("decision packet failed validation: {}", outcome.errors.join("; "));
    }
    let normalized = outcome.normalized.expect("ok implies normalized");

    persist(kind, &normalized)?;
    Ok(normalized)
}

/// Build (or return the existing) refresh-required packet for a hard-stale
/// scope. The `blocking_state` folds in the staleness reasons so a change in
/// *why* a scope is stale produces a distinct packet rather than silently
/// reusing a stale one whose reasons no longer apply.
pub fn ensure_refresh_required_packet(
    scope: &Scope,
    reasons: &[String],
    repo_head_sha: Option<&str>,
    last_scanned_head_sha: Option<&str>,
    last_scan_time: Option<DateTime<Utc>>,
    last_merge_event_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<DecisionPacket> {
    let blocking_state = format!("hard_stale:{}", reasons.join(","));

    let mut what_is_known = Vec::new();
    if let Some(sha) = repo_head_sha {
        what_is_known.push(format!("repo_head_sha: {sha}"));
    }
    if let Some(sha) = last_scanned_head_sha {
        what_is_known.push(format!("last_scanned_head_sha: {sha}"));
    }
    if let Some(t) = last_scan_time {
        what_is_known.push(format!("last_scan_time: {}", t.to_rfc3339()));
    }
    if let Some(t) = last_merge_event_time {
        what_is_known.push(format!("last_merge_event_time: {}", t.to_rfc3339()));
    }

    let context = DecisionContext {
        summary: format!("{scope} is hard-stale; automation has refused to proceed."),
        why_automation_failed: format!(
            "evaluateRepoStaleness/evaluateScopeStaleness returned hard_stale=true ({})",
            reasons.join(", ")
        ),
        what_is_known,
    };

    let questions = vec![DecisionQuestion {
        id: "refresh-confirm".to_string(),
        question: format!("Refresh knowledge for {scope} before committee work resumes?"),
        expected_answer_type: "choice".to_string(),
        constraints: vec!["yes".to_string(), "no".to_string()],
        blocks: vec!["committee_run".to_string()],
    }];

    ensure_open_packet(
        REFRESH_REQUIRED_KIND,
        scope,
        "hard_stale_refusal",
        &blocking_state,
        context,
        questions,
        vec!["knowledge for this scope is treated as stale until refreshed".to_string()],
        now,
    )
}

/// Record an answer against an open packet and mark it `answered`, making it
/// ineligible for idempotent reuse by future `ensure_open_packet` calls for
/// the same `(kind, scope)` (§4.9: "answered packets ... become ineligible
/// for idempotent reuse").
pub fn answer_packet(kind: &str, scope: &Scope, now: DateTime<Utc>) -> Result<DecisionPacket> {
    let Some(mut packet) = find_open_packet(kind, scope)? else {
        bail!("no open {kind} packet for {scope}");
    };
    packet.status = DecisionPacketStatus::Answered;
    packet.answered_at = Some(now);
    persist(kind, &packet)?;
    Ok(packet)
}
