//! Contract name/address registry and node membership.
//!
//! Protocol contracts are looked up by name; registering a new address under
//! an existing name upgrades the contract and the previous address stops
//! resolving. Only the latest address for a name may act under it.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use rpool_types::Address;

use crate::{LedgerError, Result};

/// Registry of protocol contracts, registered nodes and trusted members.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContractRegistry {
    by_name: HashMap<String, Address>,
    by_address: HashMap<Address, String>,
    nodes: BTreeSet<Address>,
    trusted: BTreeSet<Address>,
}

impl ContractRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or upgrade the contract registered under `name`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAddress`] if `address` is zero
    /// - [`LedgerError::InvalidAddress`] if `address` is already registered under another name
    pub fn register_contract(&mut self, name: &str, address: Address) -> Result<()> {
        if address.is_zero() {
            return Err(LedgerError::InvalidAddress(format!(
                "contract '{name}' cannot use the zero address"
            )));
        }
        if let Some(existing) = self.by_address.get(&address) {
            if existing != name {
                return Err(LedgerError::InvalidAddress(format!(
                    "{address} is already registered as '{existing}'"
                )));
            }
        }

        if let Some(previous) = self.by_name.insert(name.to_string(), address) {
            self.by_address.remove(&previous);
            tracing::info!(contract = name, %previous, %address, "contract upgraded");
        } else {
            tracing::debug!(contract = name, %address, "contract registered");
        }
        self.by_address.insert(address, name.to_string());
        Ok(())
    }

    /// Address currently registered under `name`.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.by_name.get(name).copied()
    }

    /// Name the address is registered under, if any.
    pub fn name_of(&self, address: &Address) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    /// `true` if `address` is the latest contract registered under `name`.
    pub fn is_latest(&self, name: &str, address: &Address) -> bool {
        self.address_of(name).as_ref() == Some(address)
    }

    /// `true` if `address` is any registered protocol contract.
    pub fn is_contract(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    /// Every registered contract name with its latest address.
    pub fn contracts(&self) -> impl Iterator<Item = (&str, &Address)> {
        self.by_name.iter().map(|(name, address)| (name.as_str(), address))
    }

    /// Register a node operator.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAddress`] if `node` is zero or a protocol contract
    pub fn register_node(&mut self, node: Address) -> Result<()> {
        if node.is_zero() || self.is_contract(&node) {
            return Err(LedgerError::InvalidAddress(format!(
                "{node} cannot be registered as a node"
            )));
        }
        if self.nodes.insert(node) {
            tracing::info!(%node, "node registered");
        }
        Ok(())
    }

    /// `true` if `node` is a registered node operator.
    pub fn is_node(&self, node: &Address) -> bool {
        self.nodes.contains(node)
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Registered nodes in address order.
    pub fn nodes(&self) -> impl Iterator<Item = &Address> {
        self.nodes.iter()
    }

    /// Add or remove a node from the trusted member set.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAddress`] if `node` is not a registered node
    pub fn set_trusted(&mut self, node: Address, trusted: bool) -> Result<()> {
        if !self.is_node(&node) {
            return Err(LedgerError::InvalidAddress(format!(
                "{node} is not a registered node"
            )));
        }
        if trusted {
            self.trusted.insert(node);
        } else {
            self.trusted.remove(&node);
        }
        Ok(())
    }

    /// `true` if `node` is a trusted member.
    pub fn is_trusted(&self, node: &Address) -> bool {
        self.trusted.contains(node)
    }

    /// Number of trusted members.
    pub fn trusted_count(&self) -> usize {
        self.trusted.len()
    }

    /// Trusted members in address order.
    pub fn trusted(&self) -> impl Iterator<Item = &Address> {
        self.trusted.iter()
    }
}
