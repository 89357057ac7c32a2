//! Platform/supplier revenue split.
//!
//! Commission resolution order is tier-level, then deal-level, then the
//! platform default from [`EngineConfig`]. Pure functions; conservation holds
//! by construction: `platform_cut + net_to_supplier == price_paid`.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::deal::Deal;
use crate::math::{apply_bps, sub_u64};
use crate::tier::Tier;
use crate::{Bps, Money, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub platform_cut: Money,
    pub net_to_supplier: Money,
}

/// Resolve the applicable commission for a tier of a deal.
pub fn commission_bps(tier: &Tier, deal_commission: Option<Bps>, default: Bps) -> Bps {
    tier.commission.or(deal_commission).unwrap_or(default)
}

/// Split a paid price into the platform cut and the supplier's net.
pub fn split(price_paid: Money, commission: Bps) -> Result<CommissionSplit> {
    let platform_cut = apply_bps(price_paid.get(), commission)?;
    let net = sub_u64(price_paid.get(), platform_cut)?;
    Ok(CommissionSplit {
        platform_cut: Money::new(platform_cut),
        net_to_supplier: Money::new(net),
    })
}

/// Split with commission resolved from the tier/deal/config chain.
pub fn split_for(
    price_paid: Money,
    tier: &Tier,
    deal: &Deal,
    config: &EngineConfig,
) -> Result<CommissionSplit> {
    let bps = commission_bps(tier, deal.platform_commission, config.default_commission);
    split(price_paid, bps)
}

/// Supplier-facing preview: the split at the tier's nominal price.
pub fn preview(tier: &Tier, deal: &Deal, config: &EngineConfig) -> Result<CommissionSplit> {
    let nominal = crate::pricing::nominal_price(tier, deal.original_price)?;
    split_for(nominal, tier, deal, config)
}
