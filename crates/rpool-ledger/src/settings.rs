//! DAO rewards settings.
//!
//! Supplies the claim interval length in blocks and the share of each
//! interval's rewards every claiming contract is entitled to. Percentages
//! are scaled by [`BASE`] and their sum never exceeds 100%.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rpool_types::{BASE, U256};

use crate::{LedgerError, Result};

/// Default claim interval: roughly one day of 12-second blocks.
pub const DEFAULT_CLAIM_INTERVAL_BLOCKS: u64 = 7_200;

/// Read-only settings view the rewards pool consumes.
pub trait RewardsSettings {
    /// Length of a claim interval in blocks.
    fn claim_interval_blocks(&self) -> u64;

    /// Configured share of the interval rewards for a contract name. Zero
    /// when the name has no configured share.
    fn claim_percentage(&self, contract_name: &str) -> U256;

    /// Names of every contract with a configured share.
    fn claimers(&self) -> Vec<String>;
}

/// In-memory DAO settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoSettings {
    claim_interval_blocks: u64,
    claim_percentages: BTreeMap<String, U256>,
}

impl Default for DaoSettings {
    fn default() -> Self {
        Self {
            claim_interval_blocks: DEFAULT_CLAIM_INTERVAL_BLOCKS,
            claim_percentages: BTreeMap::new(),
        }
    }
}

impl DaoSettings {
    /// Create settings with the given interval and no claimers.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSetting`] if `claim_interval_blocks` is zero
    pub fn new(claim_interval_blocks: u64) -> Result<Self> {
        let mut settings = Self::default();
        settings.set_claim_interval_blocks(claim_interval_blocks)?;
        Ok(settings)
    }

    /// Change the claim interval length.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSetting`] if `blocks` is zero
    pub fn set_claim_interval_blocks(&mut self, blocks: u64) -> Result<()> {
        if blocks == 0 {
            return Err(LedgerError::InvalidSetting(
                "claim interval must be at least one block".to_string(),
            ));
        }
        self.claim_interval_blocks = blocks;
        tracing::debug!(blocks, "rewards claim interval updated");
        Ok(())
    }

    /// Set the share of a claiming contract. A zero share keeps the name
    /// listed but removes its entitlement.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSetting`] if `perc` exceeds 100%
    /// - [`LedgerError::InvalidSetting`] if the total across claimers would exceed 100%
    pub fn set_claim_percentage(&mut self, contract_name: &str, perc: U256) -> Result<()> {
        if perc > BASE {
            return Err(LedgerError::InvalidSetting(format!(
                "claimer '{contract_name}' percentage {perc} exceeds 100%"
            )));
        }

        let others = self
            .claim_percentages
            .iter()
            .filter(|(name, _)| name.as_str() != contract_name)
            .try_fold(U256::ZERO, |acc, (_, p)| acc.checked_add(*p))
            .ok_or(LedgerError::Overflow("claimer percentage total"))?;
        let total = others
            .checked_add(perc)
            .ok_or(LedgerError::Overflow("claimer percentage total"))?;
        if total > BASE {
            return Err(LedgerError::InvalidSetting(format!(
                "claimer percentages would total {total}, above 100%"
            )));
        }

        self.claim_percentages.insert(contract_name.to_string(), perc);
        tracing::debug!(contract = contract_name, %perc, "claimer percentage updated");
        Ok(())
    }

    /// Sum of all configured shares.
    pub fn total_percentage(&self) -> U256 {
        self.claim_percentages
            .values()
            .fold(U256::ZERO, |acc, p| acc.saturating_add(*p))
    }
}

impl RewardsSettings for DaoSettings {
    fn claim_interval_blocks(&self) -> u64 {
        self.claim_interval_blocks
    }

    fn claim_percentage(&self, contract_name: &str) -> U256 {
        self.claim_percentages
            .get(contract_name)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn claimers(&self) -> Vec<String> {
        self.claim_percentages.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perc(tenths: u64) -> U256 {
        U256::from(tenths) * BASE / U256::from(10u64)
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(DaoSettings::new(0).is_err());
        let mut settings = DaoSettings::new(100).expect("settings");
        assert!(settings.set_claim_interval_blocks(0).is_err());
        assert_eq!(settings.claim_interval_blocks(), 100);
    }

    #[test]
    fn test_unknown_claimer_is_zero() {
        let settings = DaoSettings::default();
        assert_eq!(settings.claim_percentage("claim.node"), U256::ZERO);
    }

    #[test]
    fn test_total_capped_at_base() {
        let mut settings = DaoSettings::new(100).expect("settings");
        settings.set_claim_percentage("claim.node", perc(7)).expect("node");
        settings.set_claim_percentage("claim.dao", perc(3)).expect("dao");
        assert_eq!(settings.total_percentage(), BASE);

        let result = settings.set_claim_percentage("claim.trusted_node", perc(1));
        assert!(matches!(result, Err(LedgerError::InvalidSetting(_))));
        assert_eq!(settings.claim_percentage("claim.trusted_node"), U256::ZERO);
    }

    #[test]
    fn test_replacing_share_excludes_old_value() {
        let mut settings = DaoSettings::new(100).expect("settings");
        settings.set_claim_percentage("claim.node", perc(7)).expect("node");
        settings.set_claim_percentage("claim.dao", perc(3)).expect("dao");
        // Lowering node then raising dao stays within 100%.
        settings.set_claim_percentage("claim.node", perc(5)).expect("lower node");
        settings.set_claim_percentage("claim.dao", perc(5)).expect("raise dao");
        assert_eq!(settings.claim_percentage("claim.dao"), perc(5));
    }

    #[test]
    fn test_above_base_rejected() {
        let mut settings = DaoSettings::default();
        assert!(settings
            .set_claim_percentage("claim.node", BASE + U256::from(1u64))
            .is_err());
    }

    #[test]
    fn test_claimers_listed_in_order() {
        let mut settings = DaoSettings::default();
        settings.set_claim_percentage("claim.node", perc(5)).expect("node");
        settings.set_claim_percentage("claim.dao", U256::ZERO).expect("dao");
        assert_eq!(settings.claimers(), vec!["claim.dao", "claim.node"]);
    }

    #[test]
    fn test_settings_serialization() {
        let mut settings = DaoSettings::new(100).expect("settings");
        settings.set_claim_percentage("claim.node", perc(5)).expect("node");
        let json = serde_json::to_string(&settings).expect("serialize");
        let parsed: DaoSettings = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, settings);
    }
}
