//! Stake deposit, withdrawal, slashing and counters.
//!
//! ## Deposit ordering
//!
//! ```text
//! 1. token.transfer_from(ledger, node -> ledger, amount)
//! 2. token.approve(ledger -> vault, amount); vault.deposit("stake_ledger", amount)
//! 3. total_stake += amount; node_stake[node] += amount
//! ```
//!
//! New counter values are computed before the first external call, so once
//! the transfers succeed nothing can fail before the counters commit.

use std::collections::BTreeMap;

use rpool_ledger::{ContractRegistry, TokenLedger, Vault};
use rpool_types::{names, Address, CallContext, PoolEvent, U256};

use crate::{Result, StakeError};

/// Aggregate and per-node staked collateral.
#[derive(Clone, Debug)]
pub struct StakeLedger {
    address: Address,
    total_stake: U256,
    node_stakes: BTreeMap<Address, U256>,
}

impl StakeLedger {
    /// Create an empty ledger at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_stake: U256::ZERO,
            node_stakes: BTreeMap::new(),
        }
    }

    /// Rebuild a ledger from persisted node stakes. The total is recomputed
    /// from the parts so the invariant holds by construction.
    ///
    /// # Errors
    ///
    /// - [`StakeError::Overflow`] if the stakes do not fit a `U256` sum
    pub fn from_parts(address: Address, node_stakes: BTreeMap<Address, U256>) -> Result<Self> {
        let total_stake = node_stakes
            .values()
            .try_fold(U256::ZERO, |acc, s| acc.checked_add(*s))
            .ok_or(StakeError::Overflow("total stake"))?;
        Ok(Self {
            address,
            total_stake,
            node_stakes,
        })
    }

    /// The ledger's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sum of all node stakes.
    pub fn total_stake(&self) -> U256 {
        self.total_stake
    }

    /// Stake of a single node; zero if it never staked.
    pub fn node_stake(&self, node: &Address) -> U256 {
        self.node_stakes.get(node).copied().unwrap_or(U256::ZERO)
    }

    /// Every node that has staked, in address order.
    pub fn node_stakes(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.node_stakes.iter()
    }

    /// Stake tokens on behalf of the calling node.
    ///
    /// `ctx.sender` must be a registered node that approved this ledger for
    /// at least `amount`.
    ///
    /// # Errors
    ///
    /// - [`StakeError::NotLatestContract`] if this ledger has been upgraded away
    /// - [`StakeError::Unauthorized`] if the caller is not a registered node
    /// - [`StakeError::ZeroAmount`] if `amount` is zero
    /// - [`StakeError::Ledger`] if the token pull or vault deposit fails
    pub fn stake(
        &mut self,
        ctx: &CallContext,
        registry: &ContractRegistry,
        token: &mut dyn TokenLedger,
        vault: &mut dyn Vault,
        amount: U256,
    ) -> Result<PoolEvent> {
        let node = ctx.sender;
        self.require_latest(registry)?;
        require_node(registry, &node)?;
        if amount.is_zero() {
            return Err(StakeError::ZeroAmount);
        }
        let (total, node_total) = self.increased(&node, amount)?;

        token.transfer_from(self.address, node, self.address, amount)?;
        token.approve(self.address, vault.address(), amount)?;
        vault.deposit(token, names::STAKE_LEDGER, self.address, amount)?;

        self.total_stake = total;
        self.node_stakes.insert(node, node_total);

        tracing::info!(%node, %amount, node_stake = %node_total, total_stake = %total, "stake deposited");

        Ok(PoolEvent::StakeDeposited {
            node,
            amount,
            timestamp: ctx.timestamp,
        })
    }

    /// Withdraw stake from the vault back to the calling node.
    ///
    /// # Errors
    ///
    /// - [`StakeError::NotLatestContract`] if this ledger has been upgraded away
    /// - [`StakeError::Unauthorized`] if the caller is not a registered node
    /// - [`StakeError::ZeroAmount`] if `amount` is zero
    /// - [`StakeError::InsufficientStake`] if the node has less than `amount` staked
    /// - [`StakeError::Ledger`] if the vault withdrawal fails
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        registry: &ContractRegistry,
        token: &mut dyn TokenLedger,
        vault: &mut dyn Vault,
        amount: U256,
    ) -> Result<PoolEvent> {
        let node = ctx.sender;
        self.require_latest(registry)?;
        require_node(registry, &node)?;
        if amount.is_zero() {
            return Err(StakeError::ZeroAmount);
        }
        let (total, node_total) = self.decreased(&node, amount)?;

        vault.withdraw(token, names::STAKE_LEDGER, node, amount)?;

        self.apply(node, total, node_total);

        tracing::info!(%node, %amount, node_stake = %node_total, total_stake = %total, "stake withdrawn");

        Ok(PoolEvent::StakeWithdrawn {
            node,
            amount,
            timestamp: ctx.timestamp,
        })
    }

    /// Slash up to `amount` of a node's stake into the auction vault client.
    ///
    /// The caller must be a registered protocol contract. The slashed amount
    /// is capped at the node's current stake.
    ///
    /// # Errors
    ///
    /// - [`StakeError::NotLatestContract`] if this ledger has been upgraded away
    /// - [`StakeError::Unauthorized`] if the caller is not a protocol contract
    /// - [`StakeError::ZeroAmount`] if nothing would be slashed
    /// - [`StakeError::Ledger`] if the vault transfer fails
    pub fn slash(
        &mut self,
        ctx: &CallContext,
        registry: &ContractRegistry,
        vault: &mut dyn Vault,
        token: &Address,
        node: Address,
        amount: U256,
    ) -> Result<PoolEvent> {
        self.require_latest(registry)?;
        if !registry.is_contract(&ctx.sender) {
            return Err(StakeError::Unauthorized(format!(
                "{} is not a protocol contract",
                ctx.sender
            )));
        }
        let slashed = amount.min(self.node_stake(&node));
        if slashed.is_zero() {
            return Err(StakeError::ZeroAmount);
        }
        let (total, node_total) = self.decreased(&node, slashed)?;

        vault.transfer(token, names::STAKE_LEDGER, names::AUCTION, slashed)?;

        self.apply(node, total, node_total);

        tracing::warn!(%node, %slashed, node_stake = %node_total, "stake slashed");

        Ok(PoolEvent::StakeSlashed {
            node,
            amount: slashed,
            timestamp: ctx.timestamp,
        })
    }

    /// Raise a node's stake and the total together.
    ///
    /// # Errors
    ///
    /// - [`StakeError::Overflow`] if either counter would overflow
    pub fn increase_stake(&mut self, node: Address, amount: U256) -> Result<()> {
        let (total, node_total) = self.increased(&node, amount)?;
        self.apply(node, total, node_total);
        Ok(())
    }

    /// Lower a node's stake and the total together.
    ///
    /// # Errors
    ///
    /// - [`StakeError::InsufficientStake`] if the node has less than `amount`
    /// - [`StakeError::Underflow`] if the total would go below zero
    pub fn decrease_stake(&mut self, node: Address, amount: U256) -> Result<()> {
        let (total, node_total) = self.decreased(&node, amount)?;
        self.apply(node, total, node_total);
        Ok(())
    }

    fn require_latest(&self, registry: &ContractRegistry) -> Result<()> {
        if registry.is_latest(names::STAKE_LEDGER, &self.address) {
            Ok(())
        } else {
            Err(StakeError::NotLatestContract {
                name: names::STAKE_LEDGER,
                address: self.address,
            })
        }
    }

    fn increased(&self, node: &Address, amount: U256) -> Result<(U256, U256)> {
        let total = self
            .total_stake
            .checked_add(amount)
            .ok_or(StakeError::Overflow("total stake"))?;
        let node_total = self
            .node_stake(node)
            .checked_add(amount)
            .ok_or(StakeError::Overflow("node stake"))?;
        Ok((total, node_total))
    }

    fn decreased(&self, node: &Address, amount: U256) -> Result<(U256, U256)> {
        let staked = self.node_stake(node);
        let node_total = staked
            .checked_sub(amount)
            .ok_or(StakeError::InsufficientStake {
                node: *node,
                staked,
                requested: amount,
            })?;
        let total = self
            .total_stake
            .checked_sub(amount)
            .ok_or(StakeError::Underflow("total stake"))?;
        Ok((total, node_total))
    }

    fn apply(&mut self, node: Address, total: U256, node_total: U256) {
        self.total_stake = total;
        self.node_stakes.insert(node, node_total);
    }
}

fn require_node(registry: &ContractRegistry, node: &Address) -> Result<()> {
    if registry.is_node(node) {
        Ok(())
    } else {
        Err(StakeError::Unauthorized(format!(
            "{node} is not a registered node"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rpool_ledger::{InflationSchedule, InflationToken, LedgerError, TokenVault};
    use rpool_types::derive_address;

    struct Fixture {
        registry: ContractRegistry,
        token: InflationToken,
        vault: TokenVault,
        ledger: StakeLedger,
        treasury: Address,
    }

    fn fixture() -> Fixture {
        let treasury = derive_address("treasury");
        let ledger = StakeLedger::new(derive_address(names::STAKE_LEDGER));
        let mut registry = ContractRegistry::new();
        registry
            .register_contract(names::STAKE_LEDGER, ledger.address())
            .expect("register ledger");
        let token = InflationToken::new(
            derive_address("token"),
            treasury,
            U256::from(1_000_000u64),
            InflationSchedule::disabled(),
        )
        .expect("token");
        Fixture {
            registry,
            token,
            vault: TokenVault::new(derive_address("vault")),
            ledger,
            treasury,
        }
    }

    /// Register `label` as a node, fund it and approve the ledger.
    fn funded_node(f: &mut Fixture, label: &str, amount: u64) -> Address {
        let node = derive_address(label);
        f.registry.register_node(node).expect("register node");
        f.token
            .transfer(f.treasury, node, U256::from(amount))
            .expect("fund node");
        f.token
            .approve(node, f.ledger.address(), U256::from(amount))
            .expect("approve ledger");
        node
    }

    fn sum_of_nodes(ledger: &StakeLedger) -> U256 {
        ledger.node_stakes().fold(U256::ZERO, |acc, (_, s)| acc + *s)
    }

    #[test]
    fn test_stake_moves_tokens_into_vault() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 500);
        let ctx = CallContext::new(node, 10, 1_000);

        let event = f
            .ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(500u64))
            .expect("stake");

        assert_eq!(
            event,
            PoolEvent::StakeDeposited {
                node,
                amount: U256::from(500u64),
                timestamp: 1_000
            }
        );
        assert_eq!(f.ledger.total_stake(), U256::from(500u64));
        assert_eq!(f.ledger.node_stake(&node), U256::from(500u64));
        assert_eq!(f.token.balance_of(&node), U256::ZERO);
        assert_eq!(f.token.balance_of(&f.ledger.address()), U256::ZERO);
        assert_eq!(
            f.vault.balance_of(names::STAKE_LEDGER, &f.token.address()),
            U256::from(500u64)
        );
    }

    #[test]
    fn test_stake_unregistered_node_rejected() {
        let mut f = fixture();
        let ctx = CallContext::new(derive_address("stranger"), 10, 1_000);
        let result = f
            .ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(1u64));
        assert!(matches!(result, Err(StakeError::Unauthorized(_))));
    }

    #[test]
    fn test_stake_without_allowance_changes_nothing() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 100);
        let ctx = CallContext::new(node, 10, 1_000);

        let result = f
            .ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(101u64));
        assert!(matches!(
            result,
            Err(StakeError::Ledger(LedgerError::InsufficientAllowance { .. }))
        ));
        assert_eq!(f.ledger.total_stake(), U256::ZERO);
        assert_eq!(f.token.balance_of(&node), U256::from(100u64));
    }

    #[test]
    fn test_stake_after_upgrade_rejected() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 100);
        f.registry
            .register_contract(names::STAKE_LEDGER, derive_address("stake_ledger-v2"))
            .expect("upgrade");

        let ctx = CallContext::new(node, 10, 1_000);
        let result = f
            .ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(100u64));
        assert!(matches!(result, Err(StakeError::NotLatestContract { .. })));
    }

    #[test]
    fn test_zero_stake_rejected() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 100);
        let ctx = CallContext::new(node, 10, 1_000);
        let result = f
            .ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::ZERO);
        assert_eq!(result, Err(StakeError::ZeroAmount));
    }

    #[test]
    fn test_withdraw_returns_tokens() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 300);
        let ctx = CallContext::new(node, 10, 1_000);
        f.ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(300u64))
            .expect("stake");

        f.ledger
            .withdraw(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(120u64))
            .expect("withdraw");

        assert_eq!(f.ledger.node_stake(&node), U256::from(180u64));
        assert_eq!(f.ledger.total_stake(), U256::from(180u64));
        assert_eq!(f.token.balance_of(&node), U256::from(120u64));
    }

    #[test]
    fn test_withdraw_more_than_staked_rejected() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 300);
        let ctx = CallContext::new(node, 10, 1_000);
        f.ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(300u64))
            .expect("stake");

        let result =
            f.ledger
                .withdraw(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(301u64));
        assert!(matches!(result, Err(StakeError::InsufficientStake { .. })));
        assert_eq!(f.ledger.node_stake(&node), U256::from(300u64));
    }

    #[test]
    fn test_slash_capped_and_moved_to_auction() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 300);
        let ctx = CallContext::new(node, 10, 1_000);
        f.ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(300u64))
            .expect("stake");

        let caller = ctx.with_sender(f.ledger.address());
        let token_address = f.token.address();
        let event = f
            .ledger
            .slash(&caller, &f.registry, &mut f.vault, &token_address, node, U256::from(1_000u64))
            .expect("slash");

        assert!(matches!(event, PoolEvent::StakeSlashed { amount, .. } if amount == U256::from(300u64)));
        assert_eq!(f.ledger.total_stake(), U256::ZERO);
        assert_eq!(f.vault.balance_of(names::AUCTION, &token_address), U256::from(300u64));
    }

    #[test]
    fn test_slash_requires_contract_caller() {
        let mut f = fixture();
        let node = funded_node(&mut f, "node-1", 300);
        let ctx = CallContext::new(node, 10, 1_000);
        f.ledger
            .stake(&ctx, &f.registry, &mut f.token, &mut f.vault, U256::from(300u64))
            .expect("stake");

        let token_address = f.token.address();
        let result = f
            .ledger
            .slash(&ctx, &f.registry, &mut f.vault, &token_address, node, U256::from(1u64));
        assert!(matches!(result, Err(StakeError::Unauthorized(_))));
    }

    #[test]
    fn test_decrease_below_balance_leaves_state_unchanged() {
        let mut ledger = StakeLedger::new(derive_address(names::STAKE_LEDGER));
        let node = derive_address("node-1");
        ledger.increase_stake(node, U256::from(50u64)).expect("increase");

        let result = ledger.decrease_stake(node, U256::from(51u64));
        assert!(matches!(result, Err(StakeError::InsufficientStake { .. })));
        assert_eq!(ledger.node_stake(&node), U256::from(50u64));
        assert_eq!(ledger.total_stake(), U256::from(50u64));
    }

    #[test]
    fn test_total_matches_sum_for_random_sequences() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ledger = StakeLedger::new(derive_address(names::STAKE_LEDGER));
        let nodes: Vec<Address> = (0..8).map(|i| derive_address(&format!("node-{i}"))).collect();

        for _ in 0..500 {
            let node = nodes[rng.gen_range(0..nodes.len())];
            let amount = U256::from(rng.gen_range(1u64..1_000));
            if rng.gen_bool(0.6) {
                ledger.increase_stake(node, amount).expect("increase");
            } else {
                // Failing decreases must not disturb the invariant either.
                let _ = ledger.decrease_stake(node, amount);
            }
            assert_eq!(ledger.total_stake(), sum_of_nodes(&ledger));
        }
    }

    #[test]
    fn test_from_parts_recomputes_total() {
        let mut stakes = BTreeMap::new();
        stakes.insert(derive_address("a"), U256::from(10u64));
        stakes.insert(derive_address("b"), U256::from(32u64));
        let ledger =
            StakeLedger::from_parts(derive_address(names::STAKE_LEDGER), stakes).expect("restore");
        assert_eq!(ledger.total_stake(), U256::from(42u64));
    }
}
