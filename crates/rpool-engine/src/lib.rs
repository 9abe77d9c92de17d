//! # rpool-engine
//!
//! A full deployment of the staking and rewards system: settings, registry,
//! token, vault, stake ledger, rewards pool and claiming contracts wired
//! together behind one transaction boundary.
//!
//! Every state-changing call runs against a staged copy of the deployment
//! and replaces the committed state only when it succeeds, so a failure at
//! any step leaves every component and collaborator exactly as it was.
//!
//! ## Modules
//!
//! - [`deployment`]: Genesis, operations and the transaction boundary

pub mod deployment;

pub use deployment::{
    genesis_registry, Deployment, DeploymentParts, LocalDeployment, GENESIS_CONTRACTS,
};

use rpool_ledger::LedgerError;
use rpool_rewards::RewardsError;
use rpool_stake::StakeError;

/// Error types for deployment operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Stake ledger call failed.
    #[error("stake: {0}")]
    Stake(#[from] StakeError),

    /// Rewards pool or claiming contract call failed.
    #[error("rewards: {0}")]
    Rewards(#[from] RewardsError),

    /// Registry, settings, token or vault call failed.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    /// Genesis parameters rejected.
    #[error("invalid genesis: {0}")]
    InvalidGenesis(String),
}

/// Convenience result type for deployment operations.
pub type Result<T> = std::result::Result<T, EngineError>;
