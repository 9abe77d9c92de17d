//! Genesis, operations and the transaction boundary.

use rpool_ledger::{
    ContractRegistry, DaoSettings, InflationToken, RewardsSettings, TokenLedger, TokenVault, Vault,
};
use rpool_rewards::{
    ClaimReceipt, DaoClaim, NodeClaim, PoolEnv, PoolView, RewardsPool, TrustedNodeClaim,
};
use rpool_stake::StakeLedger;
use rpool_types::{derive_address, names, Address, BlockNumber, CallContext, PoolEvent, U256};

use crate::{EngineError, Result};

/// A deployment backed by the in-memory reference collaborators.
pub type LocalDeployment = Deployment<DaoSettings, InflationToken, TokenVault>;

/// Every protocol contract registered at genesis, in registration order.
pub const GENESIS_CONTRACTS: [&str; 6] = [
    names::STAKE_LEDGER,
    names::REWARDS_POOL,
    names::CLAIM_NODE,
    names::CLAIM_TRUSTED_NODE,
    names::CLAIM_DAO,
    names::AUCTION,
];

/// A registry holding the genesis protocol contracts at their derived
/// addresses.
///
/// # Errors
///
/// - [`EngineError::Ledger`] if registration fails
pub fn genesis_registry() -> Result<ContractRegistry> {
    let mut registry = ContractRegistry::new();
    for name in GENESIS_CONTRACTS {
        registry.register_contract(name, derive_address(name))?;
    }
    Ok(registry)
}

/// Components restored from storage.
pub struct DeploymentParts<S, T, V> {
    /// Rewards settings.
    pub settings: S,
    /// Contracts, nodes and trusted members.
    pub registry: ContractRegistry,
    /// The reward token.
    pub token: T,
    /// Token custody.
    pub vault: V,
    /// Node stakes.
    pub stake: StakeLedger,
    /// Rewards pool state.
    pub pool: RewardsPool,
    /// DAO treasury address.
    pub treasury: Address,
}

/// The whole system under one transaction boundary.
#[derive(Clone, Debug)]
pub struct Deployment<S, T, V> {
    settings: S,
    registry: ContractRegistry,
    token: T,
    vault: V,
    stake: StakeLedger,
    pool: RewardsPool,
    node_claim: NodeClaim,
    trusted_claim: TrustedNodeClaim,
    dao_claim: DaoClaim,
    events: Vec<PoolEvent>,
}

impl<S, T, V> Deployment<S, T, V>
where
    S: RewardsSettings + Clone,
    T: TokenLedger + Clone,
    V: Vault + Clone,
{
    /// Deploy every contract at `deploy_block`.
    ///
    /// Contract addresses are derived from their registered names. The
    /// rewards pool's first interval starts at `deploy_block`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidGenesis`] if `treasury` is zero or the interval length is zero
    /// - [`EngineError::Ledger`] if contract registration fails
    pub fn genesis(
        settings: S,
        token: T,
        vault: V,
        treasury: Address,
        deploy_block: BlockNumber,
    ) -> Result<Self> {
        let parts = DeploymentParts {
            registry: genesis_registry()?,
            stake: StakeLedger::new(derive_address(names::STAKE_LEDGER)),
            pool: RewardsPool::new(derive_address(names::REWARDS_POOL), deploy_block),
            settings,
            token,
            vault,
            treasury,
        };
        let deployment = Self::from_parts(parts)?;
        tracing::info!(
            deploy_block,
            treasury = %treasury,
            interval_blocks = deployment.settings.claim_interval_blocks(),
            "deployment created"
        );
        Ok(deployment)
    }

    /// Reassemble a deployment from its components.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidGenesis`] if `treasury` is zero or the interval length is zero
    pub fn from_parts(parts: DeploymentParts<S, T, V>) -> Result<Self> {
        if parts.treasury.is_zero() {
            return Err(EngineError::InvalidGenesis(
                "treasury cannot be the zero address".to_string(),
            ));
        }
        if parts.settings.claim_interval_blocks() == 0 {
            return Err(EngineError::InvalidGenesis(
                "claim interval must be at least one block".to_string(),
            ));
        }
        Ok(Self {
            node_claim: NodeClaim::new(derive_address(names::CLAIM_NODE)),
            trusted_claim: TrustedNodeClaim::new(derive_address(names::CLAIM_TRUSTED_NODE)),
            dao_claim: DaoClaim::new(derive_address(names::CLAIM_DAO), parts.treasury),
            settings: parts.settings,
            registry: parts.registry,
            token: parts.token,
            vault: parts.vault,
            stake: parts.stake,
            pool: parts.pool,
            events: Vec::new(),
        })
    }

    /// Run `op` against a staged copy and commit it only if `op` succeeds.
    pub fn transact<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let mut staged = self.clone();
        match op(&mut staged) {
            Ok(out) => {
                *self = staged;
                Ok(out)
            }
            Err(e) => {
                tracing::debug!(error = %e, "transaction rolled back");
                Err(e)
            }
        }
    }

    // ---- administration ----

    /// Register a node operator.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Ledger`] if the address is zero or already registered
    pub fn register_node(&mut self, node: Address) -> Result<()> {
        self.transact(|d| Ok(d.registry.register_node(node)?))
    }

    /// Add or remove a trusted member.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Ledger`] if `node` is not a registered node
    pub fn set_trusted(&mut self, node: Address, trusted: bool) -> Result<()> {
        self.transact(|d| Ok(d.registry.set_trusted(node, trusted)?))
    }

    /// Register or upgrade a named contract.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Ledger`] if the registry rejects the address
    pub fn register_contract(&mut self, name: &str, address: Address) -> Result<()> {
        self.transact(|d| Ok(d.registry.register_contract(name, address)?))
    }

    /// Mutable settings for governance changes.
    pub fn settings_mut(&mut self) -> &mut S {
        &mut self.settings
    }

    // ---- token ----

    /// Token approval.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Ledger`] if the token rejects it
    pub fn approve(&mut self, owner: Address, spender: Address, amount: U256) -> Result<()> {
        self.transact(|d| Ok(d.token.approve(owner, spender, amount)?))
    }

    /// Plain token transfer.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Ledger`] if `from` has too little
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
        self.transact(|d| Ok(d.token.transfer(from, to, amount)?))
    }

    /// Deposit `amount` from `ctx.sender` into the rewards pool's vault
    /// balance, on top of inflation.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Ledger`] if the sender has too little
    pub fn fund_rewards(&mut self, ctx: &CallContext, amount: U256) -> Result<()> {
        self.transact(|d| {
            let vault_address = d.vault.address();
            d.token.approve(ctx.sender, vault_address, amount)?;
            d.vault
                .deposit(&mut d.token, names::REWARDS_POOL, ctx.sender, amount)?;
            tracing::info!(from = %ctx.sender, %amount, "rewards pool funded");
            Ok(())
        })
    }

    // ---- stake ----

    /// Stake `amount` for the calling node. The node must have approved the
    /// stake ledger.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Stake`] on any stake ledger failure
    pub fn stake(&mut self, ctx: &CallContext, amount: U256) -> Result<PoolEvent> {
        self.transact(|d| {
            let event = d
                .stake
                .stake(ctx, &d.registry, &mut d.token, &mut d.vault, amount)?;
            d.events.push(event.clone());
            Ok(event)
        })
    }

    /// Withdraw `amount` of the calling node's stake.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Stake`] on any stake ledger failure
    pub fn withdraw_stake(&mut self, ctx: &CallContext, amount: U256) -> Result<PoolEvent> {
        self.transact(|d| {
            let event = d
                .stake
                .withdraw(ctx, &d.registry, &mut d.token, &mut d.vault, amount)?;
            d.events.push(event.clone());
            Ok(event)
        })
    }

    /// Slash up to `amount` of `node`'s stake. The caller must be a protocol
    /// contract.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Stake`] on any stake ledger failure
    pub fn slash_stake(
        &mut self,
        ctx: &CallContext,
        node: Address,
        amount: U256,
    ) -> Result<PoolEvent> {
        self.transact(|d| {
            let token = d.token.address();
            let event = d
                .stake
                .slash(ctx, &d.registry, &mut d.vault, &token, node, amount)?;
            d.events.push(event.clone());
            Ok(event)
        })
    }

    // ---- rewards ----

    /// Claim node rewards for the calling node.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] on any claim failure
    pub fn claim_node(&mut self, ctx: &CallContext) -> Result<ClaimReceipt> {
        self.transact(|d| {
            let node_claim = d.node_claim;
            let (mut env, pool, stake) = d.pool_env();
            let receipt = node_claim.claim(ctx, pool, stake, &mut env)?;
            d.events.extend(receipt.events.iter().cloned());
            Ok(receipt)
        })
    }

    /// Claim trusted node rewards for the calling member.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] on any claim failure
    pub fn claim_trusted_node(&mut self, ctx: &CallContext) -> Result<ClaimReceipt> {
        self.transact(|d| {
            let trusted_claim = d.trusted_claim;
            let (mut env, pool, _) = d.pool_env();
            let receipt = trusted_claim.claim(ctx, pool, &mut env)?;
            d.events.extend(receipt.events.iter().cloned());
            Ok(receipt)
        })
    }

    /// Pay the DAO share to the treasury.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] on any claim failure
    pub fn claim_dao(&mut self, ctx: &CallContext) -> Result<ClaimReceipt> {
        self.transact(|d| {
            let dao_claim = d.dao_claim;
            let (mut env, pool, _) = d.pool_env();
            let receipt = dao_claim.claim(ctx, pool, &mut env)?;
            d.events.extend(receipt.events.iter().cloned());
            Ok(receipt)
        })
    }

    /// Claim directly against the pool; `ctx.sender` is the calling
    /// claiming contract.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] on any claim failure
    pub fn claim(
        &mut self,
        ctx: &CallContext,
        claimer: Address,
        claimer_perc: U256,
    ) -> Result<ClaimReceipt> {
        self.transact(|d| {
            let (mut env, pool, _) = d.pool_env();
            let receipt = pool.claim(ctx, &mut env, claimer, claimer_perc)?;
            d.events.extend(receipt.events.iter().cloned());
            Ok(receipt)
        })
    }

    // ---- reads ----

    /// Sum of all node stakes.
    pub fn total_stake(&self) -> U256 {
        self.stake.total_stake()
    }

    /// A single node's stake.
    pub fn node_stake(&self, node: &Address) -> U256 {
        self.stake.node_stake(node)
    }

    /// Whole intervals elapsed since the live interval started.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] if the interval length is zero
    pub fn claim_intervals_passed(&self, block: BlockNumber) -> Result<u64> {
        Ok(self.pool.claim_intervals_passed(&self.settings, block)?)
    }

    /// Start of the live interval.
    pub fn claim_interval_block_start(&self) -> BlockNumber {
        self.pool.claim_interval_block_start()
    }

    /// Block of the last successful claim.
    pub fn claim_interval_block_last(&self) -> BlockNumber {
        self.pool.claim_interval_block_last()
    }

    /// Rewards available to the interval a claim at `block` lands in.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] if the forecast fails
    pub fn rewards_total(&self, block: BlockNumber) -> Result<U256> {
        Ok(self.pool.claim_interval_rewards_total(&self.view(), block)?)
    }

    /// Share of `contract` for the interval a claim at `block` lands in.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] if the interval length is zero
    pub fn contract_perc(&self, contract: &Address, block: BlockNumber) -> Result<U256> {
        Ok(self
            .pool
            .claim_interval_contract_perc(&self.view(), contract, block)?)
    }

    /// What a raw claim would pay.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] if the forecast fails
    pub fn claim_amount(
        &self,
        contract: &Address,
        claimer: &Address,
        claimer_perc: U256,
        block: BlockNumber,
    ) -> Result<U256> {
        Ok(self
            .pool
            .claim_amount(&self.view(), contract, claimer, claimer_perc, block)?)
    }

    /// What `node` would receive from a node claim at `block`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] if the node has no stake or the forecast fails
    pub fn node_claim_amount(&self, node: &Address, block: BlockNumber) -> Result<U256> {
        Ok(self
            .node_claim
            .claim_rewards_amount(&self.pool, &self.view(), &self.stake, node, block)?)
    }

    /// `true` if a node claim by `node` at `block` would pay out.
    pub fn node_claim_possible(&self, node: &Address, block: BlockNumber) -> bool {
        self.node_claim
            .claim_possible(&self.pool, &self.view(), &self.stake, node, block)
    }

    /// `true` if a trusted node claim by `member` at `block` would pay out.
    pub fn trusted_node_claim_possible(&self, member: &Address, block: BlockNumber) -> bool {
        self.trusted_claim
            .claim_possible(&self.pool, &self.view(), member, block)
    }

    /// What the treasury would receive from a DAO claim at `block`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Rewards`] if the forecast fails
    pub fn dao_claim_amount(&self, block: BlockNumber) -> Result<U256> {
        Ok(self
            .dao_claim
            .claim_rewards_amount(&self.pool, &self.view(), block)?)
    }

    /// `true` if `claimer` claimed through `contract` in the interval
    /// starting at `block_start`.
    pub fn has_claimed(&self, block_start: BlockNumber, contract: &Address, claimer: &Address) -> bool {
        self.pool.has_claimed(block_start, contract, claimer)
    }

    /// `true` if `claimer` ever claimed through `contract`.
    pub fn has_claimed_ever(&self, contract: &Address, claimer: &Address) -> bool {
        self.pool.has_claimed_ever(contract, claimer)
    }

    /// Rewards settings.
    pub fn settings(&self) -> &S {
        &self.settings
    }

    /// Contract registry.
    pub fn registry(&self) -> &ContractRegistry {
        &self.registry
    }

    /// Reward token.
    pub fn token(&self) -> &T {
        &self.token
    }

    /// Token custody.
    pub fn vault(&self) -> &V {
        &self.vault
    }

    /// Stake ledger.
    pub fn stake_ledger(&self) -> &StakeLedger {
        &self.stake
    }

    /// Rewards pool.
    pub fn pool(&self) -> &RewardsPool {
        &self.pool
    }

    /// Node claiming contract.
    pub fn node_claim(&self) -> &NodeClaim {
        &self.node_claim
    }

    /// Trusted node claiming contract.
    pub fn trusted_node_claim(&self) -> &TrustedNodeClaim {
        &self.trusted_claim
    }

    /// DAO claiming contract.
    pub fn dao_claim(&self) -> &DaoClaim {
        &self.dao_claim
    }

    /// Committed events not yet taken.
    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// Drain committed events.
    pub fn take_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    fn view(&self) -> PoolView<'_> {
        PoolView {
            settings: &self.settings,
            registry: &self.registry,
            token: &self.token,
            vault: &self.vault,
        }
    }

    fn pool_env(&mut self) -> (PoolEnv<'_>, &mut RewardsPool, &StakeLedger) {
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
}
