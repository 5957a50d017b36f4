//! Soft-stale escalation: a rolling, append-only observation record per
//! scope tracking consecutive stale observations and hard-stale
//! transitions (§4.3 "Soft-stale escalation").
//!
//! The observation counter is deliberately kept opaque — the source spec
//! leaves unspecified the count at which a soft-stale becomes a
//! human-notified event, so this module records the count but never gates
//! on it (Open Questions: "treat the observation counter as an opaque
//! input to a future policy and not add gating logic").

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lanea_utils::jsonl::{append_jsonl_line, read_jsonl};
use lanea_utils::paths::lane_a_root;
use lanea_utils::types::{Scope, StalenessSnapshot};

/// One entry in a scope's rolling observation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StalenessObservation {
    pub scope: Scope,
    pub observed_at: DateTime<Utc>,
    pub stale: bool,
    pub hard_stale: bool,
    /// Count of consecutive observations (including this one) where
    /// `stale` was true; resets to zero the moment a fresh observation is
    /// recorded.
    pub consecutive_stale_count: u32,
    /// True only on the observation where `hard_stale` first becomes true
    /// after a non-hard-stale observation (or the first ever observation).
    pub hard_stale_transition: bool,
}

fn scope_file_name(scope: &Scope) -> String {
    scope.as_str().replace(':', "-")
}

/// `ai/lane_a/staleness/observations/<scope>.jsonl`
fn observations_path(scope: &Scope) -> Utf8PathBuf {
    lane_a_root()
        .join("staleness")
        .join("observations")
        .join(format!("{}.jsonl", scope_file_name(scope)))
}

/// Whether a snapshot counts as "soft-stale": stale but not hard-stale.
/// Pure function of the snapshot alone — deliberately does not consult the
/// observation history (see module docs).
#[must_use]
pub fn is_soft_stale(snapshot: &StalenessSnapshot) -> bool {
    snapshot.stale && !snapshot.hard_stale
}

/// Append one observation derived from `snapshot`, updating the rolling
/// consecutive-stale count from the scope's prior history.
pub fn record_observation(
    scope: &Scope,
    snapshot: &StalenessSnapshot,
    now: DateTime<Utc>,
) -> Result<StalenessObservation> {
    let path = observations_path(scope);
    let history: Vec<StalenessObservation> =
        read_jsonl(&path).with_context(|| format!("reading observation history at {path}"))?;
    let previous = history.last();

    let consecutive_stale_count = if snapshot.stale {
        previous.map_or(1, |p| p.consecutive_stale_count + 1)
    } else {
        0
    };
    let was_hard_stale = previous.is_some_and(|p| p.hard_stale);
    let hard_stale_transition = snapshot.hard_stale && !was_hard_stale;

    let observation = StalenessObservation {
        scope: scope.clone(),
        observed_at: now,
        stale: snapshot.stale,
        hard_stale: snapshot.hard_stale,
        consecutive_stale_count,
        hard_stale_transition,
    };

    append_jsonl_line(&path, &observation)
        .with_context(|| format!("appending observation at {path}"))?;

    Ok(observation)
}
