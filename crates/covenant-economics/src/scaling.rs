//! Yield scaling by commitment length
//!
//! Pure functions of duration and rate. Every node must compute identical
//! bounds, so nothing here reads chain state.

use crate::constants::{DAYS_PER_YEAR, WHALE_MAX_DAYS, WHALE_MIN_DAYS};
use covenant_core::Fixed;

fn in_bounds(duration_days: i64) -> bool {
    (WHALE_MIN_DAYS..=WHALE_MAX_DAYS).contains(&duration_days)
}

/// Rate actually earned for a commitment of `duration_days` at `base_rate`.
///
/// Half of the base rate is always earned; the other half accrues linearly
/// over a year. The result never exceeds `max_rate` and is zero outside
/// 7..=365 days.
pub fn scaled_yield(duration_days: i64, base_rate: Fixed, max_rate: Fixed) -> Fixed {
    if !in_bounds(duration_days) || !base_rate.is_positive() {
        return Fixed::ZERO;
    }
    let half = base_rate.div_int(2).unwrap_or(Fixed::ZERO);
    let accrued = half
        .mul_int(duration_days)
        .div_int(DAYS_PER_YEAR)
        .unwrap_or(Fixed::ZERO);
    (half + accrued).min(max_rate)
}

/// Reward owed on `principal` coins: `duration/365 × rate × principal`
pub fn owed_amount(duration_days: i64, rate: Fixed, principal: Fixed) -> Fixed {
    if !in_bounds(duration_days) {
        return Fixed::ZERO;
    }
    (principal * rate)
        .mul_int(duration_days)
        .div_int(DAYS_PER_YEAR)
        .unwrap_or(Fixed::ZERO)
}

/// Round to whole coins and append the payout tag fraction. Nothing is
/// tagged onto a non-positive amount.
pub fn tag_payout(coins: Fixed, tag: Fixed) -> Fixed {
    if !coins.is_positive() {
        return Fixed::ZERO;
    }
    coins.round_dp(0) + tag
}

/// True when `purported` lies within `actual × (1 ± tolerance)`
pub fn within_tolerance(actual: Fixed, purported: Fixed, tolerance: Fixed) -> bool {
    let low = actual * (Fixed::ONE - tolerance);
    let high = actual * (Fixed::ONE + tolerance);
    purported >= low && purported <= high
}
