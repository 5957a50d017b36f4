//! The meeting ladder (spec.md §4.8): the fixed ordered progression of
//! question tiers a Review/Update Meeting walks one question at a time.
//!
//! `REFRESH` only applies if the scope was stale when the meeting opened
//! and no question has been asked yet; every other tier applies once per
//! meeting and is skipped once an answer covers it.

use serde::{Deserialize, Serialize};

/// One rung of the ladder, in walk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Refresh,
    Vision,
    Requirements,
    DomainData,
    Data,
    Api,
    Infra,
    Ops,
}

impl Tier {
    /// The full ladder, in walk order. `Refresh` is conditionally
    /// applicable (see [`next_tier`]); the rest always are.
    pub const ORDER: [Tier; 8] = [
        Tier::Refresh,
        Tier::Vision,
        Tier::Requirements,
        Tier::DomainData,
        Tier::Data,
        Tier::Api,
        Tier::Infra,
        Tier::Ops,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Refresh => "refresh",
            Tier::Vision => "vision",
            Tier::Requirements => "requirements",
            Tier::DomainData => "domain_data",
            Tier::Data => "data",
            Tier::Api => "api",
            Tier::Infra => "infra",
            Tier::Ops => "ops",
        }
    }

    #[must_use]
    pub fn from_str_opt(s: &str) -> Option<Tier> {
        Tier::ORDER.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the next tier a meeting should ask about, or `None` if every
/// applicable tier is already covered.
///
/// `answered_tiers` is the set of tiers an answer already covers (by
/// `Tier::as_str`, as recorded on each `MeetingQuestion`). `scope_was_stale`
/// and `any_question_asked` gate `Refresh`: it is only offered on the very
/// first question of a meeting opened against a stale scope.
#[must_use]
pub fn next_tier(answered_tiers: &[Tier], scope_was_stale: bool, any_question_asked: bool) -> Option<Tier> {
    if scope_was_stale && !any_question_asked && !answered_tiers.contains(&Tier::Refresh) {
        return Some(Tier::Refresh);
    }
    Tier::ORDER
        .into_iter()
        .filter(|t| *t != Tier::Refresh)
        .find(|t| !answered_tiers.contains(t))
}

/// Whether every applicable tier is covered: the meeting is ready to close.
#[must_use]
pub fn all_tiers_satisfied(answered_tiers: &[Tier]) -> bool {
    Tier::ORDER
        .into_iter()
        .filter(|t| *t != Tier::Refresh)
        .all(|t| answered_tiers.contains(&t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_only_offered_first_and_when_stale() {
        assert_eq!(next_tier(&[], true, false), Some(Tier::Refresh));
        assert_eq!(next_tier(&[], true, true), Some(Tier::Vision));
        assert_eq!(next_tier(&[], false, false), Some(Tier::Vision));
    }

    #[test]
    fn walks_tiers_in_order_skipping_answered() {
        assert_eq!(next_tier(&[Tier::Vision], false, true), Some(Tier::Requirements));
        assert_eq!(
            next_tier(&[Tier::Vision, Tier::Requirements, Tier::DomainData, Tier::Data], false, true),
            Some(Tier::Api)
        );
    }

    #[test]
    fn all_satisfied_once_every_non_refresh_tier_answered() {
        let all = vec![
            Tier::Vision,
            Tier::Requirements,
            Tier::DomainData,
            Tier::Data,
            Tier::Api,
            Tier::Infra,
            Tier::Ops,
        ];
        assert!(all_tiers_satisfied(&all));
        assert_eq!(next_tier(&all, false, true), None);
    }

    #[test]
    fn round_trips_through_as_str() {
        for tier in Tier::ORDER {
            assert_eq!(Tier::from_str_opt(tier.as_str()), Some(tier));
        }
    }
}
