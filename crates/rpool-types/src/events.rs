//! Protocol events.
//!
//! Events are returned by successful state-changing calls and committed to
//! the deployment's event log together with the state they describe.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::BlockNumber;

/// All events emitted by the stake ledger and the rewards pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// A node deposited stake.
    StakeDeposited {
        node: Address,
        amount: U256,
        timestamp: u64,
    },
    /// A node withdrew stake.
    StakeWithdrawn {
        node: Address,
        amount: U256,
        timestamp: u64,
    },
    /// Stake was slashed and moved to the auction client.
    StakeSlashed {
        node: Address,
        amount: U256,
        timestamp: u64,
    },
    /// Pending inflation was minted into the rewards pool.
    InflationMinted { amount: U256, block: BlockNumber },
    /// The claim interval rolled forward and was re-snapshotted.
    IntervalRolled {
        block_start: BlockNumber,
        intervals_passed: u64,
        interval_total: U256,
    },
    /// A claimer received rewards through a claiming contract.
    RewardsClaimed {
        contract: Address,
        claimer: Address,
        amount: U256,
        timestamp: u64,
    },
}

impl PoolEvent {
    /// Short type name, matching the serialized `event_type` tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StakeDeposited { .. } => "stake_deposited",
            Self::StakeWithdrawn { .. } => "stake_withdrawn",
            Self::StakeSlashed { .. } => "stake_slashed",
            Self::InflationMinted { .. } => "inflation_minted",
            Self::IntervalRolled { .. } => "interval_rolled",
            Self::RewardsClaimed { .. } => "rewards_claimed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_matches_type_name() {
        let event = PoolEvent::RewardsClaimed {
            contract: Address::repeat_byte(0x01),
            claimer: Address::repeat_byte(0x02),
            amount: U256::from(500u64),
            timestamp: 1_700_000_000,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event_type"], event.event_type());
    }
}
