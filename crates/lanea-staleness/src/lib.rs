//! Staleness Policy Engine (§4.3): decides, for a repository or project
//! scope, whether knowledge state is consistent with live repositories and
//! recent merge events, producing a three-level verdict (fresh /
//! soft-stale / hard-stale).
//!
//! The threshold, the "now" clock, and the git surface are the three
//! process-wide dependencies this module touches, and all three are
//! injected rather than read globally (§10 "Global mutable state").

pub mod engine;
pub mod events;
pub mod observation;
pub mod threshold;

pub use engine::{evaluate_repo_staleness, evaluate_scope_staleness};
pub use events::{latest_merge_event_time_for_repo, SegmentEvent, MAX_SEGMENT_FILES_SCANNED};
pub use observation::{is_soft_stale, record_observation, StalenessObservation};
pub use threshold::StalenessThreshold;
