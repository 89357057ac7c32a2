//! Checked money arithmetic.
//!
//! All monetary computation in the engine goes through these helpers:
//! u128 intermediates, explicit overflow errors, and **round half up** as the
//! single rounding mode for division (prices settle to whole currency units,
//! and half-up keeps `first <= avg <= last` intact at tier boundaries).

use crate::{Bps, DealPoolError, Result, BPS_U64};

pub fn add_u64(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b)
        .ok_or_else(|| DealPoolError::BoundedValueExceeded("u64 overflow in add".into()))
}

pub fn sub_u64(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b)
        .ok_or_else(|| DealPoolError::InvalidInput("u64 underflow in sub".into()))
}

/// `round_half_up(a * b / denom)` with a u128 intermediate.
pub fn mul_div_round_half_up(a: u64, b: u64, denom: u64) -> Result<u64> {
    if denom == 0 {
        return Err(DealPoolError::InvalidInput("division by zero".into()));
    }
    let num = (a as u128)
        .checked_mul(b as u128)
        .ok_or_else(|| DealPoolError::BoundedValueExceeded("u128 overflow in mul".into()))?;
    let half = (denom as u128) / 2;
    let out = (num + half) / (denom as u128);
    u64::try_from(out)
        .map_err(|_| DealPoolError::BoundedValueExceeded("u64 overflow in div".into()))
}

/// `round_half_up(amount * bps / 10_000)`.
pub fn apply_bps(amount: u64, bps: Bps) -> Result<u64> {
    mul_div_round_half_up(amount, bps.as_u64(), BPS_U64)
}
