//! Fixed-point helpers.
//!
//! Percentages are `U256` values scaled by [`BASE`] (1.0 = 1e18). Every
//! product is taken before the division so that a single truncation toward
//! zero happens per step.

use alloy_primitives::U256;

/// Fixed-point unit: 1.0 = 1e18.
pub const BASE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Checked `a * b / d`, truncating toward zero.
///
/// Returns `None` on overflow or when `d` is zero.
pub fn mul_div(a: U256, b: U256, d: U256) -> Option<U256> {
    if d.is_zero() {
        return None;
    }
    a.checked_mul(b)?.checked_div(d)
}

/// `true` if `0 < perc <= BASE`.
pub fn is_valid_percentage(perc: U256) -> bool {
    !perc.is_zero() && perc <= BASE
}
