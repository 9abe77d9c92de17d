//! Claiming contracts.
//!
//! Each category of reward recipient claims through its own registered
//! contract. The contract decides who may claim and what fraction of the
//! contract's share they get, then calls into the pool as itself.
//!
//! Node and trusted node fractions depend on stake and membership, which
//! move during an interval. Those contracts hand the pool a table of
//! fractions for every eligible claimer; the pool keeps the table from the
//! contract's first claim in the interval, so the fractions it pays always
//! sum to at most the whole share.

use std::collections::BTreeMap;

use rpool_ledger::ContractRegistry;
use rpool_stake::StakeLedger;
use rpool_types::{mul_div, names, Address, BlockNumber, CallContext, BASE, U256};

use crate::pool::{ClaimReceipt, PoolEnv, PoolView, RewardsPool};
use crate::{Result, RewardsError};

fn require_latest(registry: &ContractRegistry, name: &str, address: Address) -> Result<()> {
    if registry.is_latest(name, &address) {
        Ok(())
    } else {
        Err(RewardsError::NotLatestContract(address))
    }
}

/// Node operators claim in proportion to their stake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeClaim {
    address: Address,
}

impl NodeClaim {
    /// A node claim contract at `address`.
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// The contract's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Fractions for every staked node as of now: stake over total stake.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::Overflow`] on arithmetic overflow
    pub fn claimer_shares(&self, stake: &StakeLedger) -> Result<BTreeMap<Address, U256>> {
        let total = stake.total_stake();
        stake
            .node_stakes()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(node, amount)| {
                mul_div(*amount, BASE, total)
                    .map(|share| (*node, share))
                    .ok_or(RewardsError::Overflow("node share"))
            })
            .collect()
    }

    /// `true` if a claim by `node` at `block` would pay out.
    pub fn claim_possible(
        &self,
        pool: &RewardsPool,
        view: &PoolView<'_>,
        stake: &StakeLedger,
        node: &Address,
        block: BlockNumber,
    ) -> bool {
        view.registry.is_node(node)
            && self
                .claim_rewards_amount(pool, view, stake, node, block)
                .is_ok_and(|amount| !amount.is_zero())
    }

    /// Forecast of what `node` would receive claiming at `block`.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotClaimable`] if the node has no share this interval
    /// - any error of [`RewardsPool::claim_amount`]
    pub fn claim_rewards_amount(
        &self,
        pool: &RewardsPool,
        view: &PoolView<'_>,
        stake: &StakeLedger,
        node: &Address,
        block: BlockNumber,
    ) -> Result<U256> {
        let perc = pool.claimer_share(view.settings, &self.address, node, block, || {
            self.claimer_shares(stake)
        })?;
        if perc.is_zero() {
            return Err(RewardsError::NotClaimable(format!(
                "{node} has no stake share this interval"
            )));
        }
        pool.claim_amount(view, &self.address, node, perc, block)
    }

    /// Claim rewards for the calling node.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotLatestContract`] if this contract has been upgraded away
    /// - [`RewardsError::NotClaimable`] if the caller is not a registered node
    /// - any error of [`RewardsPool::claim_with_shares`]
    pub fn claim(
        &self,
        ctx: &CallContext,
        pool: &mut RewardsPool,
        stake: &StakeLedger,
        env: &mut PoolEnv<'_>,
    ) -> Result<ClaimReceipt> {
        require_latest(env.registry, names::CLAIM_NODE, self.address)?;
        let node = ctx.sender;
        if !env.registry.is_node(&node) {
            return Err(RewardsError::NotClaimable(format!(
                "{node} is not a registered node"
            )));
        }
        pool.claim_with_shares(&ctx.with_sender(self.address), env, node, || {
            self.claimer_shares(stake)
        })
    }
}

/// Trusted members split this contract's share equally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrustedNodeClaim {
    address: Address,
}

impl TrustedNodeClaim {
    /// A trusted node claim contract at `address`.
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// The contract's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// An equal fraction for every current trusted member.
    pub fn claimer_shares(&self, registry: &ContractRegistry) -> BTreeMap<Address, U256> {
        let Some(share) = BASE.checked_div(U256::from(registry.trusted_count())) else {
            return BTreeMap::new();
        };
        registry.trusted().map(|member| (*member, share)).collect()
    }

    /// `true` if a claim by `member` at `block` would pay out.
    pub fn claim_possible(
        &self,
        pool: &RewardsPool,
        view: &PoolView<'_>,
        member: &Address,
        block: BlockNumber,
    ) -> bool {
        self.claim_rewards_amount(pool, view, member, block)
            .is_ok_and(|amount| !amount.is_zero())
    }

    /// Forecast of what `member` would receive claiming at `block`.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotClaimable`] if `member` is not trusted
    /// - any error of [`RewardsPool::claim_amount`]
    pub fn claim_rewards_amount(
        &self,
        pool: &RewardsPool,
        view: &PoolView<'_>,
        member: &Address,
        block: BlockNumber,
    ) -> Result<U256> {
        if !view.registry.is_trusted(member) {
            return Err(RewardsError::NotClaimable(format!(
                "{member} is not a trusted node"
            )));
        }
        let perc = pool.claimer_share(view.settings, &self.address, member, block, || {
            Ok(self.claimer_shares(view.registry))
        })?;
        pool.claim_amount(view, &self.address, member, perc, block)
    }

    /// Claim rewards for the calling trusted member.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotLatestContract`] if this contract has been upgraded away
    /// - [`RewardsError::NotClaimable`] if the caller is not trusted
    /// - any error of [`RewardsPool::claim_with_shares`]
    pub fn claim(
        &self,
        ctx: &CallContext,
        pool: &mut RewardsPool,
        env: &mut PoolEnv<'_>,
    ) -> Result<ClaimReceipt> {
        let registry = env.registry;
        require_latest(registry, names::CLAIM_TRUSTED_NODE, self.address)?;
        let member = ctx.sender;
        if !registry.is_trusted(&member) {
            return Err(RewardsError::NotClaimable(format!(
                "{member} is not a trusted node"
            )));
        }
        pool.claim_with_shares(&ctx.with_sender(self.address), env, member, || {
            Ok(self.claimer_shares(registry))
        })
    }
}

/// The DAO's whole share goes to its treasury.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DaoClaim {
    address: Address,
    treasury: Address,
}

impl DaoClaim {
    /// A DAO claim contract at `address` paying out to `treasury`.
    pub fn new(address: Address, treasury: Address) -> Self {
        Self { address, treasury }
    }

    /// The contract's address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Where the DAO share is paid.
    pub fn treasury(&self) -> Address {
        self.treasury
    }

    /// Forecast of the treasury payout at `block`.
    ///
    /// # Errors
    ///
    /// - any error of [`RewardsPool::claim_amount`]
    pub fn claim_rewards_amount(
        &self,
        pool: &RewardsPool,
        view: &PoolView<'_>,
        block: BlockNumber,
    ) -> Result<U256> {
        pool.claim_amount(view, &self.address, &self.treasury, BASE, block)
    }

    /// Pay the DAO share to the treasury. Anyone may trigger it.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotLatestContract`] if this contract has been upgraded away
    /// - any error of [`RewardsPool::claim`]
    pub fn claim(
        &self,
        ctx: &CallContext,
        pool: &mut RewardsPool,
        env: &mut PoolEnv<'_>,
    ) -> Result<ClaimReceipt> {
        require_latest(env.registry, names::CLAIM_DAO, self.address)?;
        tracing::debug!(caller = %ctx.sender, treasury = %self.treasury, "dao claim triggered");
        pool.claim(&ctx.with_sender(self.address), env, self.treasury, BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpool_ledger::{
        DaoSettings, InflationSchedule, InflationToken, TokenLedger, TokenVault, Vault,
    };
    use rpool_types::derive_address;

    const INTERVAL: u64 = 100;

    fn perc(tenths: u64) -> U256 {
        BASE * U256::from(tenths) / U256::from(10u64)
    }

    struct Fixture {
        settings: DaoSettings,
        registry: ContractRegistry,
        token: InflationToken,
        vault: TokenVault,
        pool: RewardsPool,
        stake: StakeLedger,
        node_claim: NodeClaim,
        trusted_claim: TrustedNodeClaim,
        dao_claim: DaoClaim,
        treasury: Address,
    }

    impl Fixture {
        fn new() -> Self {
            let treasury = derive_address("treasury");
            let pool = RewardsPool::new(derive_address(names::REWARDS_POOL), 1000);
            let stake = StakeLedger::new(derive_address(names::STAKE_LEDGER));
            let node_claim = NodeClaim::new(derive_address(names::CLAIM_NODE));
            let trusted_claim = TrustedNodeClaim::new(derive_address(names::CLAIM_TRUSTED_NODE));
            let dao_claim = DaoClaim::new(derive_address(names::CLAIM_DAO), treasury);

            let mut registry = ContractRegistry::new();
            for (name, address) in [
                (names::REWARDS_POOL, pool.address()),
                (names::STAKE_LEDGER, stake.address()),
                (names::CLAIM_NODE, node_claim.address()),
                (names::CLAIM_TRUSTED_NODE, trusted_claim.address()),
                (names::CLAIM_DAO, dao_claim.address()),
            ] {
                registry.register_contract(name, address).expect("register");
            }

            let mut settings = DaoSettings::new(INTERVAL).expect("settings");
            settings
                .set_claim_percentage(names::CLAIM_NODE, perc(5))
                .expect("node share");
            settings
                .set_claim_percentage(names::CLAIM_TRUSTED_NODE, perc(2))
                .expect("trusted share");
            settings
                .set_claim_percentage(names::CLAIM_DAO, perc(3))
                .expect("dao share");

            let token = InflationToken::new(
                derive_address("token"),
                treasury,
                U256::from(1_000_000u64),
                InflationSchedule::disabled(),
            )
            .expect("token");

            Self {
                settings,
                registry,
                token,
                vault: TokenVault::new(derive_address("vault")),
                pool,
                stake,
                node_claim,
                trusted_claim,
                dao_claim,
                treasury,
            }
        }

        fn fund_pool(&mut self, amount: u64) {
            let amount = U256::from(amount);
            self.token
                .approve(self.treasury, self.vault.address(), amount)
                .expect("approve");
            self.vault
                .deposit(&mut self.token, names::REWARDS_POOL, self.treasury, amount)
                .expect("fund");
        }

        fn add_node(&mut self, label: &str, stake: u64) -> Address {
            let node = derive_address(label);
            self.registry.register_node(node).expect("register node");
            self.stake
                .increase_stake(node, U256::from(stake))
                .expect("stake");
            node
        }

        fn env(&mut self) -> (PoolEnv<'_>, &mut RewardsPool, &StakeLedger) {
            (
                PoolEnv {
                    settings: &self.settings,
                    registry: &self.registry,
                    token: &mut self.token,
                    vault: &mut self.vault,
                },
                &mut self.pool,
                &self.stake,
            )
        }

        fn view(&self) -> PoolView<'_> {
            PoolView {
                settings: &self.settings,
                registry: &self.registry,
                token: &self.token,
                vault: &self.vault,
            }
        }
    }

    fn ctx(sender: Address, block: BlockNumber) -> CallContext {
        CallContext::new(sender, block, 1_700_000_000 + block)
    }

    #[test]
    fn test_node_shares_proportional_to_stake() {
        let mut f = Fixture::new();
        let a = f.add_node("node-a", 300);
        let b = f.add_node("node-b", 100);
        let shares = f.node_claim.claimer_shares(&f.stake).expect("shares");
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[&a], perc(10) * U256::from(3u64) / U256::from(4u64));
        assert_eq!(shares[&b], perc(10) / U256::from(4u64));

        let stranger = derive_address("stranger");
        assert!(matches!(
            f.node_claim
                .claim_rewards_amount(&f.pool, &f.view(), &f.stake, &stranger, 1105),
            Err(RewardsError::NotClaimable(_))
        ));
    }

    #[test]
    fn test_late_staker_waits_for_next_interval() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let a = f.add_node("node-a", 1_000);

        let node_claim = f.node_claim;
        let dao = f.dao_claim;
        let (mut env, pool, stake) = f.env();
        let first = node_claim
            .claim(&ctx(a, 1105), pool, stake, &mut env)
            .expect("a claims");
        assert_eq!(first.amount, U256::from(500u64));

        let b = f.add_node("node-b", 1_000);
        assert!(!f.node_claim.claim_possible(&f.pool, &f.view(), &f.stake, &b, 1110));
        let (mut env, pool, stake) = f.env();
        let late = node_claim.claim(&ctx(b, 1110), pool, stake, &mut env);
        assert!(matches!(late, Err(RewardsError::NotClaimable(_))));

        // The node share was paid once in full; the DAO share is intact.
        let receipt = dao
            .claim(&ctx(derive_address("keeper"), 1120), pool, &mut env)
            .expect("dao claims");
        assert_eq!(receipt.amount, U256::from(300u64));

        // Next interval, b is in the table at the new stake split.
        assert!(f.node_claim.claim_possible(&f.pool, &f.view(), &f.stake, &b, 1205));
        let (mut env, pool, stake) = f.env();
        let next = node_claim
            .claim(&ctx(b, 1205), pool, stake, &mut env)
            .expect("b claims");
        // Half of the node share of the remaining 200.
        assert_eq!(next.amount, U256::from(50u64));
    }

    #[test]
    fn test_trusted_table_fixed_within_interval() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let a = f.add_node("node-a", 1);
        let b = f.add_node("node-b", 1);
        f.registry.set_trusted(a, true).expect("trust a");

        let trusted = f.trusted_claim;
        let (mut env, pool, _) = f.env();
        let first = trusted.claim(&ctx(a, 1105), pool, &mut env).expect("a");
        assert_eq!(first.amount, U256::from(200u64));

        f.registry.set_trusted(b, true).expect("trust b");
        assert_eq!(f.trusted_claim.claimer_shares(&f.registry).len(), 2);
        let (mut env, pool, _) = f.env();
        let late = trusted.claim(&ctx(b, 1110), pool, &mut env);
        assert!(matches!(late, Err(RewardsError::NotClaimable(_))));
    }

    #[test]
    fn test_node_claim_pays_stake_share() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let a = f.add_node("node-a", 300);
        f.add_node("node-b", 100);

        let forecast = f
            .node_claim
            .claim_rewards_amount(&f.pool, &f.view(), &f.stake, &a, 1105)
            .expect("forecast");
        assert!(f.node_claim.claim_possible(&f.pool, &f.view(), &f.stake, &a, 1105));

        let node_claim = f.node_claim;
        let (mut env, pool, stake) = f.env();
        let receipt = node_claim
            .claim(&ctx(a, 1105), pool, stake, &mut env)
            .expect("claim");

        // 0.5 of 1000 to nodes, three quarters of that to node-a.
        assert_eq!(receipt.amount, U256::from(375u64));
        assert_eq!(receipt.amount, forecast);
        assert_eq!(f.token.balance_of(&a), U256::from(375u64));
        assert!(f.pool.has_claimed_ever(&f.node_claim.address(), &a));
        assert!(!f.node_claim.claim_possible(&f.pool, &f.view(), &f.stake, &a, 1150));
    }

    #[test]
    fn test_node_claim_requires_registered_node() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let stranger = derive_address("stranger");
        let node_claim = f.node_claim;
        let (mut env, pool, stake) = f.env();
        let result = node_claim.claim(&ctx(stranger, 1105), pool, stake, &mut env);
        assert!(matches!(result, Err(RewardsError::NotClaimable(_))));
    }

    #[test]
    fn test_trusted_members_split_equally() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let a = f.add_node("node-a", 1);
        let b = f.add_node("node-b", 1);
        f.registry.set_trusted(a, true).expect("trust a");
        f.registry.set_trusted(b, true).expect("trust b");

        let trusted = f.trusted_claim;
        let (mut env, pool, _) = f.env();
        let first = trusted.claim(&ctx(a, 1105), pool, &mut env).expect("a");
        let second = trusted.claim(&ctx(b, 1106), pool, &mut env).expect("b");

        // 0.2 of 1000, halved.
        assert_eq!(first.amount, U256::from(100u64));
        assert_eq!(second.amount, U256::from(100u64));
    }

    #[test]
    fn test_untrusted_member_rejected() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let a = f.add_node("node-a", 1);
        assert!(!f.trusted_claim.claim_possible(&f.pool, &f.view(), &a, 1105));

        let trusted = f.trusted_claim;
        let (mut env, pool, _) = f.env();
        let result = trusted.claim(&ctx(a, 1105), pool, &mut env);
        assert!(matches!(result, Err(RewardsError::NotClaimable(_))));
    }

    #[test]
    fn test_dao_claim_pays_treasury_once() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        let before = f.token.balance_of(&f.treasury);
        let forecast = f
            .dao_claim
            .claim_rewards_amount(&f.pool, &f.view(), 1105)
            .expect("forecast");

        let dao = f.dao_claim;
        let anyone = derive_address("keeper");
        let (mut env, pool, _) = f.env();
        let receipt = dao.claim(&ctx(anyone, 1105), pool, &mut env).expect("claim");
        let again = dao.claim(&ctx(anyone, 1106), pool, &mut env);

        assert_eq!(receipt.amount, U256::from(300u64));
        assert_eq!(receipt.amount, forecast);
        assert!(matches!(again, Err(RewardsError::AlreadyClaimed { .. })));
        assert_eq!(f.token.balance_of(&f.treasury), before + U256::from(300u64));
    }

    #[test]
    fn test_upgraded_claim_contract_rejected() {
        let mut f = Fixture::new();
        f.fund_pool(1_000);
        f.registry
            .register_contract(names::CLAIM_DAO, derive_address("claim.dao-v2"))
            .expect("upgrade");

        let dao = f.dao_claim;
        let (mut env, pool, _) = f.env();
        let result = dao.claim(&ctx(derive_address("keeper"), 1105), pool, &mut env);
        assert_eq!(result, Err(RewardsError::NotLatestContract(dao.address())));
    }
}
