//! Position-dependent tier pricing.
//!
//! The nominal tier price is the tier's explicit price, or the deal's
//! original price discounted by the tier's bps. Within a tier, the first
//! admitted participant pays below nominal, the last pays above it, and
//! intermediate positions interpolate linearly between the two endpoints.
//! A single-slot tier pays nominal exactly.
//!
//! Every output is a whole currency unit, rounded half up (see `math`).

use serde::{Deserialize, Serialize};

use crate::math::{add_u64, mul_div_round_half_up, sub_u64};
use crate::tier::Tier;
use crate::{Bps, DealPoolError, Money, Result, BPS_U64};

/// Default first-buyer discount off the nominal tier price: 2.5%.
pub const DEFAULT_FIRST_BUYER_DISCOUNT_BPS: u16 = 250;
/// Default last-buyer premium over the nominal tier price: 2.5%.
pub const DEFAULT_LAST_BUYER_PREMIUM_BPS: u16 = 250;

/// Position-based adjustment applied inside a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSpread {
    pub first_buyer_discount: Bps,
    pub last_buyer_premium: Bps,
}

impl Default for PositionSpread {
    fn default() -> Self {
        Self {
            first_buyer_discount: Bps::new(DEFAULT_FIRST_BUYER_DISCOUNT_BPS)
                .unwrap_or(Bps::ZERO),
            last_buyer_premium: Bps::new(DEFAULT_LAST_BUYER_PREMIUM_BPS).unwrap_or(Bps::ZERO),
        }
    }
}

/// Display summary for one tier: the endpoints of the position spread and the
/// nominal (position-independent) price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPriceSummary {
    pub first_buyer_price: Money,
    pub last_buyer_price: Money,
    /// Nominal tier price, undiscounted by position.
    pub avg_price: Money,
}

/// Nominal price of a tier: `explicit_price`, else the discounted original.
pub fn nominal_price(tier: &Tier, original_price: Money) -> Result<Money> {
    if let Some(price) = tier.explicit_price {
        return Ok(price);
    }
    let remaining = BPS_U64 - tier.discount.as_u64();
    let v = mul_div_round_half_up(original_price.get(), remaining, BPS_U64)?;
    Ok(Money::new(v))
}

/// Price for a specific position within a tier.
///
/// `position_in_tier` is 1-based (`1` = first slot of the tier). Positions
/// past the tier's size clamp to the last slot: overflow participants in the
/// floor tier pay the last-buyer price.
///
/// Preconditions:
/// - `position_in_tier >= 1` (else returns an error; fail-closed).
pub fn price_for_position(
    tier: &Tier,
    original_price: Money,
    position_in_tier: u32,
    spread: PositionSpread,
) -> Result<Money> {
    if position_in_tier == 0 {
        return Err(DealPoolError::InvalidInput(
            "position_in_tier is 1-based and must be >= 1".into(),
        ));
    }
    let nominal = nominal_price(tier, original_price)?;
    let size = tier.size();
    if size == 1 {
        return Ok(nominal);
    }

    let first = first_buyer_price(nominal, spread)?;
    let last = last_buyer_price(nominal, spread)?;
    let pos = position_in_tier.min(size);

    // Linear interpolation between the rounded endpoints, normalized by
    // (pos - 1) / (size - 1). Endpoints reproduce exactly.
    let range = sub_u64(last.get(), first.get())?;
    let offset = mul_div_round_half_up(range, (pos - 1) as u64, (size - 1) as u64)?;
    Ok(Money::new(add_u64(first.get(), offset)?))
}

/// Three-value display summary for a tier.
pub fn summarize(tier: &Tier, original_price: Money, spread: PositionSpread) -> Result<TierPriceSummary> {
    let nominal = nominal_price(tier, original_price)?;
    if tier.size() == 1 {
        return Ok(TierPriceSummary {
            first_buyer_price: nominal,
            last_buyer_price: nominal,
            avg_price: nominal,
        });
    }
    Ok(TierPriceSummary {
        first_buyer_price: first_buyer_price(nominal, spread)?,
        last_buyer_price: last_buyer_price(nominal, spread)?,
        avg_price: nominal,
    })
}

/// Summaries for every tier of a table, in table order.
pub fn summarize_table(
    table: &crate::tier::TierTable,
    original_price: Money,
    spread: PositionSpread,
) -> Result<Vec<TierPriceSummary>> {
    table
        .tiers()
        .iter()
        .map(|tier| summarize(tier, original_price, spread))
        .collect()
}

fn first_buyer_price(nominal: Money, spread: PositionSpread) -> Result<Money> {
    let factor = BPS_U64 - spread.first_buyer_discount.as_u64();
    Ok(Money::new(mul_div_round_half_up(
        nominal.get(),
        factor,
        BPS_U64,
    )?))
}

fn last_buyer_price(nominal: Money, spread: PositionSpread) -> Result<Money> {
    let factor = BPS_U64 + spread.last_buyer_premium.as_u64();
    Ok(Money::new(mul_div_round_half_up(
        nominal.get(),
        factor,
        BPS_U64,
    )?))
}
