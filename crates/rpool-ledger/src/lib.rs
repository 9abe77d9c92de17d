//! # rpool-ledger
//!
//! The collaborators the stake ledger and rewards pool depend on, each behind
//! a trait, with reference in-memory implementations.
//!
//! ## Modules
//!
//! - [`settings`]: DAO rewards settings (interval length, claimer percentages)
//! - [`registry`]: Contract name/address registry and node membership
//! - [`token`]: Inflationary fungible token with allowances
//! - [`vault`]: Token custody on behalf of named clients

pub mod registry;
pub mod settings;
pub mod token;
pub mod vault;

pub use registry::ContractRegistry;
pub use settings::{DaoSettings, RewardsSettings};
pub use token::{InflationSchedule, InflationToken, TokenLedger};
pub use vault::{TokenVault, Vault};

use rpool_types::{Address, U256};

/// Error types for collaborator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Account balance too low for a transfer.
    #[error("insufficient balance: {account} has {available}, needs {required}")]
    InsufficientBalance {
        /// The debited account.
        account: Address,
        /// Its current balance.
        available: U256,
        /// The amount requested.
        required: U256,
    },

    /// Spender allowance too low for a pull.
    #[error("insufficient allowance: {spender} may spend {available} of {owner}, needs {required}")]
    InsufficientAllowance {
        /// Token owner.
        owner: Address,
        /// Approved spender.
        spender: Address,
        /// Current allowance.
        available: U256,
        /// The amount requested.
        required: U256,
    },

    /// Vault client balance too low for a withdrawal or transfer.
    #[error("insufficient vault balance for client '{client}': has {available}, needs {required}")]
    InsufficientVaultBalance {
        /// Vault client name.
        client: String,
        /// Its current balance.
        available: U256,
        /// The amount requested.
        required: U256,
    },

    /// A zero amount was supplied where a positive one is required.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Invalid address argument.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Settings change rejected.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Arithmetic overflow.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Convenience result type for collaborator operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
