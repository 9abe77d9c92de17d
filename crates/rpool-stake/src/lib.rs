//! # rpool-stake
//!
//! Node collateral stake ledger.
//!
//! Node operators stake tokens that the ledger pulls into its own custody
//! account and forwards to the vault. Aggregate and per-node counters are
//! updated only after both transfers succeed, and always together, so the
//! total equals the sum of node stakes after every call.
//!
//! ## Modules
//!
//! - [`ledger`]: Stake deposit, withdrawal, slashing and counters

pub mod ledger;

pub use ledger::StakeLedger;

use rpool_ledger::LedgerError;
use rpool_types::{Address, U256};

/// Error types for stake operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StakeError {
    /// The call did not route through the latest registered ledger.
    #[error("stake ledger {address} is not the latest registered '{name}' contract")]
    NotLatestContract {
        /// Registered name checked.
        name: &'static str,
        /// This ledger's address.
        address: Address,
    },

    /// Caller is not allowed to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Amount is zero.
    #[error("stake amount is zero")]
    ZeroAmount,

    /// Node has less stake than requested.
    #[error("insufficient stake: {node} has {staked}, requested {requested}")]
    InsufficientStake {
        /// The node.
        node: Address,
        /// Its current stake.
        staked: U256,
        /// The amount requested.
        requested: U256,
    },

    /// A decrease would take a counter below zero.
    #[error("stake underflow in {0}")]
    Underflow(&'static str),

    /// An increase would overflow a counter.
    #[error("stake overflow in {0}")]
    Overflow(&'static str),

    /// Token or vault call failed.
    #[error("collaborator failure: {0}")]
    Ledger(#[from] LedgerError),
}

/// Convenience result type for stake operations.
pub type Result<T> = std::result::Result<T, StakeError>;
