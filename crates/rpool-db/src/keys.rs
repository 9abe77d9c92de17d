//! Storage keys and value encodings.
//!
//! A row's key is `blake3::derive_key(STORAGE_KEY_CONTEXT, name || 0x00 ||
//! params)`, where `params` is the JSON array of the identifying parameters.
//! Addresses are stored as `0x`-prefixed hex and amounts as decimal strings.

use rpool_types::{Address, U256};

use crate::{DbError, Result};

/// Domain separation context for storage keys.
pub const STORAGE_KEY_CONTEXT: &str = "rpool v1 storage-key";

/// Semantic names of stored values.
pub mod names {
    /// Aggregate stake.
    pub const STAKE_TOTAL: &str = "stake.total";
    /// Per-node stake, keyed by node.
    pub const STAKE_NODE: &str = "stake.node";
    /// Start of the live claim interval.
    pub const INTERVAL_BLOCK_START: &str = "rewards.interval.block.start";
    /// Block of the last successful claim.
    pub const INTERVAL_BLOCK_LAST: &str = "rewards.interval.block.last";
    /// Snapshotted interval total.
    pub const INTERVAL_TOTAL: &str = "rewards.interval.total";
    /// Snapshotted contract share, keyed by contract.
    pub const INTERVAL_CONTRACT_PERC: &str = "rewards.interval.contract.perc";
    /// Claim flag, keyed by interval start, contract and claimer.
    pub const INTERVAL_CLAIMED: &str = "rewards.interval.claimed";
    /// Claimer fractions paid in the live interval, keyed by contract.
    pub const INTERVAL_CONTRACT_CLAIMED: &str = "rewards.interval.contract.claimed";
    /// Fixed claimer share, keyed by contract, interval start and claimer.
    pub const CLAIMER_SHARE: &str = "rewards.claimer.share";
    /// Ever-claimed flag, keyed by contract and claimer.
    pub const CLAIMED_EVER: &str = "rewards.claimed.ever";
    /// Token address.
    pub const TOKEN_ADDRESS: &str = "token.address";
    /// Token balance, keyed by holder.
    pub const TOKEN_BALANCE: &str = "token.balance";
    /// Token total supply.
    pub const TOKEN_SUPPLY: &str = "token.supply";
    /// Inflation schedule as JSON.
    pub const TOKEN_SCHEDULE: &str = "token.inflation.schedule";
    /// Block up to which inflation has been minted.
    pub const TOKEN_LAST_MINT: &str = "token.inflation.last_mint";
    /// Vault address.
    pub const VAULT_ADDRESS: &str = "vault.address";
    /// Vault balance, keyed by client and token.
    pub const VAULT_BALANCE: &str = "vault.balance";
    /// Registered contract address, keyed by name.
    pub const REGISTRY_CONTRACT: &str = "registry.contract";
    /// Registered node with its trusted flag, keyed by node.
    pub const REGISTRY_NODE: &str = "registry.node";
}

/// A semantic name plus its identifying parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageKey {
    name: &'static str,
    params: Vec<String>,
}

impl StorageKey {
    /// A key with no parameters.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: Vec::new(),
        }
    }

    /// Append an identifying parameter.
    pub fn param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }

    /// The semantic name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parameters as a JSON array.
    pub fn params_json(&self) -> Result<String> {
        serde_json::to_string(&self.params).map_err(|e| DbError::Serialization(e.to_string()))
    }

    /// The 32-byte row key.
    pub fn hash(&self) -> Result<[u8; 32]> {
        let params = self.params_json()?;
        let mut material = Vec::with_capacity(self.name.len() + 1 + params.len());
        material.extend_from_slice(self.name.as_bytes());
        material.push(0);
        material.extend_from_slice(params.as_bytes());
        Ok(blake3::derive_key(STORAGE_KEY_CONTEXT, &material))
    }
}

/// Encode an address as `0x`-prefixed hex.
pub fn encode_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Decode a `0x`-prefixed hex address.
pub fn decode_address(s: &str) -> Result<Address> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes =
        hex::decode(digits).map_err(|e| DbError::Corrupt(format!("address '{s}': {e}")))?;
    if bytes.len() != 20 {
        return Err(DbError::Corrupt(format!(
            "address '{s}' has {} bytes",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

/// Encode an amount as a decimal string.
pub fn encode_amount(amount: &U256) -> String {
    amount.to_string()
}

/// Decode a decimal amount.
pub fn decode_amount(s: &str) -> Result<U256> {
    U256::from_str_radix(s, 10).map_err(|e| DbError::Corrupt(format!("amount '{s}': {e}")))
}

/// Decode a block number.
pub fn decode_block(s: &str) -> Result<u64> {
    s.parse()
        .map_err(|e| DbError::Corrupt(format!("block '{s}': {e}")))
}
