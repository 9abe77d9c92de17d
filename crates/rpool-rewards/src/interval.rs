//! Interval arithmetic and the entitlement formula.
//!
//! ## Formulas
//!
//! ```text
//! intervals_passed = floor((block - block_start) / blocks_per_interval)
//! rolled_start     = block_start + intervals_passed * blocks_per_interval
//! contract_share   = contract_perc * interval_total / BASE
//! claimer_share    = claimer_perc * contract_share / BASE
//! ```
//!
//! Rollover always lands on an exact multiple of the interval length from
//! the previous start, never on the current block.

use rpool_types::{mul_div, BlockNumber, BASE, U256};

use crate::{Result, RewardsError};

/// Whole intervals elapsed since `block_start`. Zero before the start.
///
/// # Errors
///
/// - [`RewardsError::InvalidInterval`] if `blocks_per_interval` is zero
pub fn intervals_passed(
    block_start: BlockNumber,
    blocks_per_interval: u64,
    block: BlockNumber,
) -> Result<u64> {
    if blocks_per_interval == 0 {
        return Err(RewardsError::InvalidInterval);
    }
    Ok(block.saturating_sub(block_start) / blocks_per_interval)
}

/// The interval start after rolling forward `passed` intervals.
///
/// # Errors
///
/// - [`RewardsError::Overflow`] if the block height overflows
pub fn rolled_block_start(
    block_start: BlockNumber,
    blocks_per_interval: u64,
    passed: u64,
) -> Result<BlockNumber> {
    passed
        .checked_mul(blocks_per_interval)
        .and_then(|advance| block_start.checked_add(advance))
        .ok_or(RewardsError::Overflow("interval block start"))
}

/// A claimer's share of the interval rewards.
///
/// Multiplies before dividing in both steps; each division truncates toward
/// zero.
///
/// # Errors
///
/// - [`RewardsError::Overflow`] if an intermediate product overflows
pub fn entitlement(contract_perc: U256, claimer_perc: U256, interval_total: U256) -> Result<U256> {
    let contract_share = mul_div(contract_perc, interval_total, BASE)
        .ok_or(RewardsError::Overflow("contract share"))?;
    mul_div(claimer_perc, contract_share, BASE).ok_or(RewardsError::Overflow("claimer share"))
}
