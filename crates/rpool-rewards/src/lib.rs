//! # rpool-rewards
//!
//! Interval-based rewards pool.
//!
//! Newly minted tokens accumulate in the vault under the pool's client name.
//! Time is cut into fixed-length claim intervals; at the first claim of each
//! interval the pool snapshots the total available and every claiming
//! contract's share, and each claimer may then take its share once per
//! interval per contract.
//!
//! ## Modules
//!
//! - [`interval`]: Interval arithmetic and the entitlement formula
//! - [`pool`]: The rewards pool state machine
//! - [`claims`]: Claiming contracts for nodes, trusted nodes and the DAO

pub mod claims;
pub mod interval;
pub mod pool;

pub use claims::{DaoClaim, NodeClaim, TrustedNodeClaim};
pub use pool::{ClaimReceipt, ClaimerShares, PoolEnv, PoolView, RewardsPool, RewardsPoolParts};

use rpool_ledger::LedgerError;
use rpool_types::{Address, BlockNumber, U256};

/// Error types for rewards operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewardsError {
    /// The call did not route through the latest registered pool.
    #[error("rewards pool {0} is not the latest registered contract")]
    NotLatestContract(Address),

    /// Caller is not a claiming contract with a non-zero share.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A percentage outside `(0, 1e18]`.
    #[error("invalid percentage {0}: must be greater than 0 and at most 1e18")]
    InvalidPercentage(U256),

    /// The claimer is the zero address.
    #[error("claimer cannot be the zero address")]
    ZeroAddress,

    /// Claim interval length is zero.
    #[error("claim interval length must be at least one block")]
    InvalidInterval,

    /// The claimer fractions paid through a contract would pass 100% of
    /// its share for the interval.
    #[error("{contract} has paid out {claimed} of its share this interval; {requested} more would exceed 1e18")]
    ShareExhausted {
        /// The claiming contract.
        contract: Address,
        /// Sum of claimer fractions already paid.
        claimed: U256,
        /// Fraction requested by this claim.
        requested: U256,
    },

    /// The claimer already claimed from this contract in this interval.
    #[error("{claimer} already claimed from {contract} in the interval starting at block {block_start}")]
    AlreadyClaimed {
        /// The claiming contract.
        contract: Address,
        /// The claimer.
        claimer: Address,
        /// Start of the interval.
        block_start: BlockNumber,
    },

    /// The computed entitlement is zero.
    #[error("{claimer} is not entitled to any rewards from {contract}")]
    NotEntitled {
        /// The claiming contract.
        contract: Address,
        /// The claimer.
        claimer: Address,
    },

    /// A claiming contract refused the claimer.
    #[error("claim not possible: {0}")]
    NotClaimable(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Token or vault call failed.
    #[error("collaborator failure: {0}")]
    Ledger(#[from] LedgerError),
}

/// Convenience result type for rewards operations.
pub type Result<T> = std::result::Result<T, RewardsError>;
