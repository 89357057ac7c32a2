//! Discount tier tables and participant-count resolution.
//!
//! A tier maps a contiguous range of participant counts to a discount (or an
//! explicit price). Tables are validated once, at deal-authoring time; after
//! construction every lookup is total and cannot fail.

use serde::{Deserialize, Serialize};

use crate::{Bps, DealPoolError, Money, Result};

/// Upper bound on tiers per deal (fail-closed at construction).
pub const MAX_TIERS: usize = 64;

/// One discount step: a contiguous participant-count range mapped to a
/// discount in bps, optionally overridden by an explicit price, optionally
/// carrying a tier-level commission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub min_participants: u32,
    pub max_participants: u32,
    pub discount: Bps,
    pub explicit_price: Option<Money>,
    pub commission: Option<Bps>,
}

impl Tier {
    /// Constructs a tier.
    ///
    /// Preconditions:
    /// - `min_participants >= 1`
    /// - `max_participants >= min_participants`
    ///
    /// The discount bound (`<= 100%`) is carried by the `Bps` type itself.
    pub fn new(min_participants: u32, max_participants: u32, discount: Bps) -> Result<Tier> {
        if min_participants == 0 {
            return Err(DealPoolError::ConfigError(
                "tier min_participants must be >= 1".into(),
            ));
        }
        if max_participants < min_participants {
            return Err(DealPoolError::ConfigError(format!(
                "tier range inverted: max {max_participants} < min {min_participants}"
            )));
        }
        Ok(Tier {
            min_participants,
            max_participants,
            discount,
            explicit_price: None,
            commission: None,
        })
    }

    pub fn with_explicit_price(mut self, price: Money) -> Tier {
        self.explicit_price = Some(price);
        self
    }

    pub fn with_commission(mut self, commission: Bps) -> Tier {
        self.commission = Some(commission);
        self
    }

    /// Number of slots in the tier.
    pub fn size(&self) -> u32 {
        self.max_participants - self.min_participants + 1
    }

    pub fn contains(&self, participant_count: u32) -> bool {
        participant_count >= self.min_participants && participant_count <= self.max_participants
    }
}

/// Immutable, validated tier table.
///
/// Invariants (checked by the constructor, so resolution never re-checks):
/// - non-empty, at most [`MAX_TIERS`] entries
/// - first tier starts at participant 1
/// - tiers are contiguous and non-overlapping: `next.min == prev.max + 1`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Tier>", into = "Vec<Tier>")]
pub struct TierTable(Vec<Tier>);

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<TierTable> {
        if tiers.is_empty() {
            return Err(DealPoolError::ConfigError("tier table is empty".into()));
        }
        if tiers.len() > MAX_TIERS {
            return Err(DealPoolError::ConfigError(format!(
                "too many tiers ({} > {MAX_TIERS})",
                tiers.len()
            )));
        }
        if tiers[0].min_participants != 1 {
            return Err(DealPoolError::ConfigError(format!(
                "first tier must start at participant 1, got {}",
                tiers[0].min_participants
            )));
        }
        for pair in tiers.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.min_participants != prev.max_participants + 1 {
                return Err(DealPoolError::ConfigError(format!(
                    "tier table must be contiguous: tier starting at {} does not follow max {}",
                    next.min_participants, prev.max_participants
                )));
            }
        }
        Ok(TierTable(tiers))
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.0
    }

    pub fn last(&self) -> &Tier {
        // Non-empty by construction.
        &self.0[self.0.len() - 1]
    }

    /// Resolves the active tier for a participant count.
    ///
    /// Counts beyond the last tier's `max_participants` resolve to the last
    /// tier (the floor tier; discounts never regress). Counts below the
    /// first tier's range resolve to the first tier (an empty deal displays
    /// tier-1 pricing).
    pub fn resolve(&self, participant_count: u32) -> &Tier {
        self.resolve_indexed(participant_count).1
    }

    /// As [`resolve`](Self::resolve), also returning the tier's index.
    pub fn resolve_indexed(&self, participant_count: u32) -> (usize, &Tier) {
        for (i, tier) in self.0.iter().enumerate() {
            if participant_count <= tier.max_participants {
                return (i, tier);
            }
        }
        (self.0.len() - 1, self.last())
    }
}

impl From<TierTable> for Vec<Tier> {
    fn from(table: TierTable) -> Vec<Tier> {
        table.0
    }
}

impl TryFrom<Vec<Tier>> for TierTable {
    type Error = DealPoolError;
    fn try_from(tiers: Vec<Tier>) -> Result<TierTable> {
        TierTable::new(tiers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bps(v: u16) -> Bps {
        Bps::new(v).unwrap()
    }

    fn three_tier_table() -> TierTable {
        TierTable::new(vec![
            Tier::new(1, 20, bps(0)).unwrap(),
            Tier::new(21, 60, bps(1_000)).unwrap(),
            Tier::new(61, 100, bps(1_800)).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(TierTable::new(vec![]).is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(Tier::new(10, 5, bps(100)).is_err());
    }

    #[test]
    fn gap_is_rejected() {
        let err = TierTable::new(vec![
            Tier::new(1, 20, bps(0)).unwrap(),
            Tier::new(25, 60, bps(1_000)).unwrap(),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn overlap_is_rejected() {
        let err = TierTable::new(vec![
            Tier::new(1, 20, bps(0)).unwrap(),
            Tier::new(15, 60, bps(1_000)).unwrap(),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn table_must_start_at_one() {
        assert!(TierTable::new(vec![Tier::new(5, 20, bps(0)).unwrap()]).is_err());
    }

    #[test]
    fn resolve_picks_containing_tier() {
        let table = three_tier_table();
        assert_eq!(table.resolve(1).max_participants, 20);
        assert_eq!(table.resolve(20).max_participants, 20);
        assert_eq!(table.resolve(21).max_participants, 60);
        assert_eq!(table.resolve(61).max_participants, 100);
        assert_eq!(table.resolve(100).max_participants, 100);
    }

    #[test]
    fn counts_beyond_last_tier_clamp_to_floor_tier() {
        let table = three_tier_table();
        let (i, tier) = table.resolve_indexed(10_000);
        assert_eq!(i, 2);
        assert_eq!(tier.discount.get(), 1_800);
    }

    #[test]
    fn zero_count_resolves_to_first_tier() {
        let table = three_tier_table();
        let (i, _) = table.resolve_indexed(0);
        assert_eq!(i, 0);
    }

    prop_compose! {
        /// A valid contiguous table: random tier widths starting at 1.
        fn arb_table()(widths in proptest::collection::vec(1u32..50, 1..8)) -> TierTable {
            let mut tiers = Vec::new();
            let mut min = 1u32;
            for (i, w) in widths.iter().enumerate() {
                let max = min + w - 1;
                tiers.push(Tier::new(min, max, Bps::new((i as u16) * 100).unwrap()).unwrap());
                min = max + 1;
            }
            TierTable::new(tiers).unwrap()
        }
    }

    proptest! {
        #[test]
        fn resolved_tier_contains_count_or_is_last(table in arb_table(), count in 1u32..400) {
            let tier = table.resolve(count);
            prop_assert!(tier.contains(count) || (tier == table.last() && count > tier.max_participants));
        }
    }
}
