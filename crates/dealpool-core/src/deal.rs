//! Deal aggregate and registration records.
//!
//! A deal owns its tier table and registrations; registrations reference the
//! deal and are immutable once written. Validation happens here, at
//! authoring time, so the join path never re-checks configuration.

use serde::{Deserialize, Serialize};

use crate::funnel::Schedule;
use crate::pricing;
use crate::tier::TierTable;
use crate::{Bps, DealId, DealPoolError, Money, ParticipantId, Result, TimestampMs};

/// Upper bound on primary capacity (fail-closed at construction).
pub const MAX_TOTAL_CAPACITY: u32 = 1_000_000;
/// Upper bound on the waiting-list pool.
pub const MAX_WAITING_LIST_CAPACITY: u32 = 100_000;

/// A group-buy deal (retail) or project (real estate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    /// Undiscounted market price the tier discounts apply to.
    pub original_price: Money,
    pub tiers: TierTable,
    /// Display goal; reaching it does not close registration by itself.
    pub target_participants: u32,
    pub total_capacity: u32,
    pub waiting_list_capacity: u32,
    /// Deal-level commission override (tier-level takes precedence).
    pub platform_commission: Option<Bps>,
    pub schedule: Schedule,
}

impl Deal {
    /// Constructs a validated deal.
    ///
    /// Preconditions (fail-closed):
    /// - `original_price > 0`
    /// - `1 <= total_capacity <= MAX_TOTAL_CAPACITY`
    /// - `waiting_list_capacity <= MAX_WAITING_LIST_CAPACITY`
    /// - `1 <= target_participants <= total_capacity`
    /// - nominal tier prices never regress as participants grow
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: DealId,
        original_price: Money,
        tiers: TierTable,
        target_participants: u32,
        total_capacity: u32,
        waiting_list_capacity: u32,
        platform_commission: Option<Bps>,
        schedule: Schedule,
    ) -> Result<Deal> {
        if original_price == Money::ZERO {
            return Err(DealPoolError::ConfigError(
                "original_price must be > 0".into(),
            ));
        }
        if total_capacity == 0 || total_capacity > MAX_TOTAL_CAPACITY {
            return Err(DealPoolError::ConfigError(format!(
                "total_capacity must be in [1, {MAX_TOTAL_CAPACITY}], got {total_capacity}"
            )));
        }
        if waiting_list_capacity > MAX_WAITING_LIST_CAPACITY {
            return Err(DealPoolError::ConfigError(format!(
                "waiting_list_capacity must be <= {MAX_WAITING_LIST_CAPACITY}, got {waiting_list_capacity}"
            )));
        }
        if target_participants == 0 || target_participants > total_capacity {
            return Err(DealPoolError::ConfigError(format!(
                "target_participants must be in [1, total_capacity], got {target_participants}"
            )));
        }

        // Discounts must not regress: each tier's nominal price is at most
        // the previous tier's. Checked here because the explicit-price
        // override makes this unverifiable from the table alone.
        let mut prev: Option<Money> = None;
        for tier in tiers.tiers() {
            let nominal = pricing::nominal_price(tier, original_price)?;
            if let Some(prev) = prev {
                if nominal > prev {
                    return Err(DealPoolError::ConfigError(format!(
                        "tier starting at {} raises the nominal price ({} > {})",
                        tier.min_participants,
                        nominal.get(),
                        prev.get()
                    )));
                }
            }
            prev = Some(nominal);
        }

        Ok(Deal {
            id,
            original_price,
            tiers,
            target_participants,
            total_capacity,
            waiting_list_capacity,
            platform_commission,
            schedule,
        })
    }

    pub fn is_registration_open(&self, now_ms: TimestampMs) -> bool {
        self.schedule.is_registration_open(now_ms)
    }
}

/// Admission outcome recorded on a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionStatus {
    Confirmed,
    WaitingList,
}

/// One participant's registration in a deal.
///
/// Immutable once written: `position` is globally monotonic per deal and is
/// never reused or reassigned, including after cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub participant_id: ParticipantId,
    pub deal_id: DealId,
    /// 1-based global position assigned at admission time.
    pub position: u32,
    pub status: AdmissionStatus,
    /// Charged price; `None` for waiting-list entries (nothing charged yet).
    pub price_paid: Option<Money>,
    /// Ordered quantity. Recorded as-is; capacity counts registrations.
    pub quantity: u32,
    pub joined_at_ms: TimestampMs,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::SalesWindow;
    use crate::tier::Tier;

    fn bps(v: u16) -> Bps {
        Bps::new(v).unwrap()
    }

    fn table() -> TierTable {
        TierTable::new(vec![
            Tier::new(1, 20, bps(0)).unwrap(),
            Tier::new(21, 60, bps(1_000)).unwrap(),
            Tier::new(61, 100, bps(1_800)).unwrap(),
        ])
        .unwrap()
    }

    fn retail() -> Schedule {
        Schedule::Retail(SalesWindow::default())
    }

    #[test]
    fn valid_deal_constructs() {
        let deal = Deal::new(
            DealId(1),
            Money::new(4_500),
            table(),
            80,
            100,
            20,
            None,
            retail(),
        );
        assert!(deal.is_ok());
    }

    #[test]
    fn zero_price_is_rejected() {
        let err = Deal::new(DealId(1), Money::ZERO, table(), 80, 100, 20, None, retail());
        assert!(err.is_err());
    }

    #[test]
    fn target_beyond_capacity_is_rejected() {
        let err = Deal::new(
            DealId(1),
            Money::new(4_500),
            table(),
            101,
            100,
            20,
            None,
            retail(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn regressing_discount_is_rejected() {
        // explicit price on the middle tier above the first tier's nominal
        let tiers = TierTable::new(vec![
            Tier::new(1, 20, bps(1_000)).unwrap(),
            Tier::new(21, 60, bps(0))
                .unwrap()
                .with_explicit_price(Money::new(9_999)),
        ])
        .unwrap();
        let err = Deal::new(
            DealId(1),
            Money::new(4_500),
            tiers,
            10,
            100,
            0,
            None,
            retail(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn zero_waiting_list_is_allowed() {
        let deal = Deal::new(
            DealId(1),
            Money::new(4_500),
            table(),
            80,
            100,
            0,
            None,
            retail(),
        );
        assert!(deal.is_ok());
    }
}
