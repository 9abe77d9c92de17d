//! # rpool-types
//!
//! Shared domain types used across the rpool workspace: addresses, 256-bit
//! amounts, the fixed-point base, registered contract names, the call
//! context every state-changing operation receives, and protocol events.

pub mod events;
pub mod fixed;

pub use alloy_primitives::{Address, U256};

pub use events::PoolEvent;
pub use fixed::{is_valid_percentage, mul_div, BASE};

/// Block height.
pub type BlockNumber = u64;

/// Context string for deterministic address derivation.
pub const ADDRESS_CONTEXT: &str = "rpool v1 address";

/// Names under which protocol contracts and vault clients are registered.
pub mod names {
    /// The stake ledger; also its vault client name.
    pub const STAKE_LEDGER: &str = "stake_ledger";
    /// The rewards pool; also its vault client name.
    pub const REWARDS_POOL: &str = "rewards_pool";
    /// Claiming contract for node operators.
    pub const CLAIM_NODE: &str = "claim.node";
    /// Claiming contract for trusted node members.
    pub const CLAIM_TRUSTED_NODE: &str = "claim.trusted_node";
    /// Claiming contract for the DAO treasury.
    pub const CLAIM_DAO: &str = "claim.dao";
    /// Vault client that receives slashed stake.
    pub const AUCTION: &str = "auction";
}

/// Derive a deterministic address from a label.
///
/// Used for contract addresses at genesis and for test accounts. The
/// address is the first 20 bytes of a domain-separated BLAKE3 key.
pub fn derive_address(label: &str) -> Address {
    let key = blake3::derive_key(ADDRESS_CONTEXT, label.as_bytes());
    Address::from_slice(&key[..20])
}

/// Who is calling, and when.
///
/// The core has no clock; the current block height and wall-clock second
/// are inputs to every call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// The calling account or contract.
    pub sender: Address,
    /// Current block height.
    pub block: BlockNumber,
    /// Current Unix timestamp in seconds.
    pub timestamp: u64,
}

impl CallContext {
    /// Build a context for `sender` at the given block and time.
    pub fn new(sender: Address, block: BlockNumber, timestamp: u64) -> Self {
        Self {
            sender,
            block,
            timestamp,
        }
    }

    /// The same block and time, called by a different sender.
    pub fn with_sender(&self, sender: Address) -> Self {
        Self { sender, ..*self }
    }
}
