//! Staleness threshold: "scan age beyond this makes a stale scope
//! hard-stale" (§4.3 step 8). Defaults to 30 minutes, configurable
//! 1..1440 via `LANEA_STALENESS_THRESHOLD_MINUTES`.

use std::time::Duration;

use anyhow::{bail, Context, Result};

pub const DEFAULT_THRESHOLD_MINUTES: u32 = 30;
pub const MIN_THRESHOLD_MINUTES: u32 = 1;
pub const MAX_THRESHOLD_MINUTES: u32 = 1440;

pub const THRESHOLD_ENV_VAR: &str = "LANEA_STALENESS_THRESHOLD_MINUTES";

/// The staleness threshold, injected rather than read globally so tests can
/// construct one directly instead of mutating process environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessThreshold {
    minutes: u32,
}

impl StalenessThreshold {
    /// Build a threshold from a minute count, rejecting anything outside
    /// `1..=1440`.
    pub fn from_minutes(minutes: u32) -> Result<Self> {
        if !(MIN_THRESHOLD_MINUTES..=MAX_THRESHOLD_MINUTES).contains(&minutes) {
            bail!(
                "staleness threshold must be between {MIN_THRESHOLD_MINUTES} and {MAX_THRESHOLD_MINUTES} minutes, got {minutes}"
            );
        }
        Ok(Self { minutes })
    }

    #[must_use]
    pub fn default_value() -> Self {
        Self {
            minutes: DEFAULT_THRESHOLD_MINUTES,
        }
    }

    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.minutes) * 60)
    }

    #[must_use]
    pub fn minutes(self) -> u32 {
        self.minutes
    }

    /// Resolve from `LANEA_STALENESS_THRESHOLD_MINUTES`, falling back to the
    /// default when unset. An unparseable or out-of-range value is an error
    /// rather than a silent fallback — misconfiguration should surface, not
    /// hide.
    pub fn from_env() -> Result<Self> {
        match std::env::var(THRESHOLD_ENV_VAR) {
            Ok(raw) => {
                let minutes: u32 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{THRESHOLD_ENV_VAR}={raw:?} is not a valid minute count"))?;
                Self::from_minutes(minutes)
            }
            Err(std::env::VarError::NotPresent) => Ok(Self::default_value()),
            Err(e) => bail!("reading {THRESHOLD_ENV_VAR}: {e}"),
        }
    }
}

impl Default for StalenessThreshold {
    fn default() -> Self {
        Self::default_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_minutes() {
        assert!(StalenessThreshold::from_minutes(0).is_err());
        assert!(StalenessThreshold::from_minutes(1441).is_err());
    }

    #[test]
    fn accepts_boundary_minutes() {
        assert!(StalenessThreshold::from_minutes(1).is_ok());
        assert!(StalenessThreshold::from_minutes(1440).is_ok());
    }

    #[test]
    fn default_is_thirty_minutes() {
        assert_eq!(StalenessThreshold::default_value().minutes(), 30);
    }
}
