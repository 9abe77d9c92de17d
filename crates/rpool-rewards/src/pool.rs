//! The rewards pool state machine.
//!
//! Intervals advance lazily: nothing happens at an interval boundary until
//! the next claim. That claim mints any pending inflation into the vault,
//! snapshots the vault balance as the interval total, snapshots every
//! configured claimer's share, and moves the interval start forward by a
//! whole number of intervals.
//!
//! Within an interval, the claimer fractions a contract passes in may add up
//! to at most 100% of that contract's share. Claiming contracts whose
//! fractions depend on mutable state (stake, membership) fix their table of
//! claimer shares at their first claim in the interval through
//! [`RewardsPool::claim_with_shares`].
//!
//! A claim stages all of its writes locally and commits them to the pool
//! only after every token and vault call has succeeded. Collaborator side
//! effects of a failed claim (an inflation mint, for instance) must be
//! discarded by the caller's transaction boundary.

use std::collections::{BTreeMap, BTreeSet};

use rpool_ledger::{ContractRegistry, RewardsSettings, TokenLedger, Vault};
use rpool_types::{
    is_valid_percentage, names, Address, BlockNumber, CallContext, PoolEvent, BASE, U256,
};

use crate::interval::{entitlement, intervals_passed, rolled_block_start};
use crate::{Result, RewardsError};

/// Read-only collaborators consulted by pool queries.
#[derive(Clone, Copy)]
pub struct PoolView<'a> {
    /// Interval length and claimer shares.
    pub settings: &'a dyn RewardsSettings,
    /// Contract names and addresses.
    pub registry: &'a ContractRegistry,
    /// The reward token.
    pub token: &'a dyn TokenLedger,
    /// Custody of the pool's tokens.
    pub vault: &'a dyn Vault,
}

/// Collaborators a claim may mutate.
pub struct PoolEnv<'a> {
    /// Interval length and claimer shares.
    pub settings: &'a dyn RewardsSettings,
    /// Contract names and addresses.
    pub registry: &'a ContractRegistry,
    /// The reward token.
    pub token: &'a mut dyn TokenLedger,
    /// Custody of the pool's tokens.
    pub vault: &'a mut dyn Vault,
}

impl PoolEnv<'_> {
    /// Borrow the collaborators read-only.
    pub fn view(&self) -> PoolView<'_> {
        PoolView {
            settings: self.settings,
            registry: self.registry,
            token: &*self.token,
            vault: &*self.vault,
        }
    }
}

/// Result of a successful claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    /// Tokens sent to the claimer.
    pub amount: U256,
    /// Events in emission order; the last is always `RewardsClaimed`.
    pub events: Vec<PoolEvent>,
}

/// Claimer shares a contract fixed at its first claim in an interval.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimerShares {
    /// Start of the interval the table applies to.
    pub block_start: BlockNumber,
    /// Fraction of the contract's share per claimer, scaled by BASE.
    pub shares: BTreeMap<Address, U256>,
}

/// Persistable pool state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RewardsPoolParts {
    /// Start of the live interval.
    pub block_start: BlockNumber,
    /// Block of the most recent successful claim.
    pub block_last: BlockNumber,
    /// Tokens available in the live interval.
    pub interval_total: U256,
    /// Contract shares snapshotted for the live interval.
    pub interval_perc: BTreeMap<Address, U256>,
    /// Sum of claimer fractions paid per contract in the live interval.
    pub interval_claimed_perc: BTreeMap<Address, U256>,
    /// Latest claimer share table per contract.
    pub claimer_shares: BTreeMap<Address, ClaimerShares>,
    /// `(interval block start, contract, claimer)` claims made.
    pub claimed: BTreeSet<(BlockNumber, Address, Address)>,
    /// `(contract, claimer)` pairs that have ever claimed.
    pub claimed_ever: BTreeSet<(Address, Address)>,
}

/// The rewards pool.
#[derive(Clone, Debug)]
pub struct RewardsPool {
    address: Address,
    block_start: BlockNumber,
    block_last: BlockNumber,
    interval_total: U256,
    interval_perc: BTreeMap<Address, U256>,
    interval_claimed_perc: BTreeMap<Address, U256>,
    claimer_shares: BTreeMap<Address, ClaimerShares>,
    claimed: BTreeSet<(BlockNumber, Address, Address)>,
    claimed_ever: BTreeSet<(Address, Address)>,
}

impl RewardsPool {
    /// Deploy a pool whose first interval starts at `deploy_block`.
    ///
    /// The first interval has no snapshot, so claims in it are authorized
    /// but pay nothing; payouts start once it has lapsed.
    pub fn new(address: Address, deploy_block: BlockNumber) -> Self {
        Self::from_parts(
            address,
            RewardsPoolParts {
                block_start: deploy_block,
                ..RewardsPoolParts::default()
            },
        )
    }

    /// Rebuild a pool from persisted state.
    pub fn from_parts(address: Address, parts: RewardsPoolParts) -> Self {
        Self {
            address,
            block_start: parts.block_start,
            block_last: parts.block_last,
            interval_total: parts.interval_total,
            interval_perc: parts.interval_perc,
            interval_claimed_perc: parts.interval_claimed_perc,
            claimer_shares: parts.claimer_shares,
            claimed: parts.claimed,
            claimed_ever: parts.claimed_ever,
        }
    }

    /// Copy out the persistable state.
    pub fn to_parts(&self) -> RewardsPoolParts {
        RewardsPoolParts {
            block_start: self.block_start,
            block_last: self.block_last,
            interval_total: self.interval_total,
            interval_perc: self.interval_perc.clone(),
            interval_claimed_perc: self.interval_claimed_perc.clone(),
            claimer_shares: self.claimer_shares.clone(),
            claimed: self.claimed.clone(),
            claimed_ever: self.claimed_ever.clone(),
        }
    }

    /// The pool's address; its token account for minted inflation.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Claim interval length from settings.
    pub fn claim_interval_blocks(&self, settings: &dyn RewardsSettings) -> u64 {
        settings.claim_interval_blocks()
    }

    /// Start of the live (snapshotted) interval.
    pub fn claim_interval_block_start(&self) -> BlockNumber {
        self.block_start
    }

    /// Block of the most recent successful claim.
    pub fn claim_interval_block_last(&self) -> BlockNumber {
        self.block_last
    }

    /// Whole intervals elapsed since the live interval started.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    pub fn claim_intervals_passed(
        &self,
        settings: &dyn RewardsSettings,
        block: BlockNumber,
    ) -> Result<u64> {
        intervals_passed(self.block_start, settings.claim_interval_blocks(), block)
    }

    /// The interval start a claim at `block` lands in.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    /// - [`RewardsError::Overflow`] if the block height overflows
    pub fn projected_block_start(
        &self,
        settings: &dyn RewardsSettings,
        block: BlockNumber,
    ) -> Result<BlockNumber> {
        let blocks = settings.claim_interval_blocks();
        let passed = intervals_passed(self.block_start, blocks, block)?;
        rolled_block_start(self.block_start, blocks, passed)
    }

    /// Tokens available for the interval a claim at `block` lands in.
    ///
    /// Once the live interval has lapsed this is a forecast: pending
    /// inflation plus the pool's vault balance. Otherwise it is the snapshot.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    /// - [`RewardsError::Ledger`] if the inflation forecast fails
    /// - [`RewardsError::Overflow`] if the forecast overflows
    pub fn claim_interval_rewards_total(
        &self,
        view: &PoolView<'_>,
        block: BlockNumber,
    ) -> Result<U256> {
        if self.claim_intervals_passed(view.settings, block)? == 0 {
            return Ok(self.interval_total);
        }
        let pending = view.token.pending_inflation(block)?;
        let held = view
            .vault
            .balance_of(names::REWARDS_POOL, &view.token.address());
        let forecast = pending
            .checked_add(held)
            .ok_or(RewardsError::Overflow("rewards forecast"))?;
        tracing::debug!(%pending, %held, %forecast, block, "rewards total forecast");
        Ok(forecast)
    }

    /// A claiming contract's share for the interval a claim at `block`
    /// lands in: live from settings once the interval has lapsed, otherwise
    /// the snapshot (zero without one).
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    pub fn claim_interval_contract_perc(
        &self,
        view: &PoolView<'_>,
        contract: &Address,
        block: BlockNumber,
    ) -> Result<U256> {
        if self.claim_intervals_passed(view.settings, block)? > 0 {
            Ok(live_percentage(view.settings, view.registry, contract))
        } else {
            Ok(self.snapshot_percentage(contract))
        }
    }

    /// Tokens `claimer` would receive claiming `claimer_perc` through
    /// `contract` at `block`. Zero whenever a claim would not pay out.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    /// - [`RewardsError::Ledger`] if the inflation forecast fails
    /// - [`RewardsError::Overflow`] on arithmetic overflow
    pub fn claim_amount(
        &self,
        view: &PoolView<'_>,
        contract: &Address,
        claimer: &Address,
        claimer_perc: U256,
        block: BlockNumber,
    ) -> Result<U256> {
        let contract_perc = self.claim_interval_contract_perc(view, contract, block)?;
        let total = self.claim_interval_rewards_total(view, block)?;
        let block_start = self.projected_block_start(view.settings, block)?;

        let claimed_perc = if block_start == self.block_start {
            self.claimed_percentage(contract)
        } else {
            U256::ZERO
        };
        if contract_perc.is_zero()
            || !is_valid_percentage(claimer_perc)
            || total.is_zero()
            || self.has_claimed(block_start, contract, claimer)
            || claimed_perc.saturating_add(claimer_perc) > BASE
        {
            return Ok(U256::ZERO);
        }
        entitlement(contract_perc, claimer_perc, total)
    }

    /// `true` if `claimer` claimed through `contract` in the interval
    /// starting at `block_start`.
    pub fn has_claimed(
        &self,
        block_start: BlockNumber,
        contract: &Address,
        claimer: &Address,
    ) -> bool {
        self.claimed.contains(&(block_start, *contract, *claimer))
    }

    /// `true` if `claimer` has ever claimed through `contract`.
    pub fn has_claimed_ever(&self, contract: &Address, claimer: &Address) -> bool {
        self.claimed_ever.contains(&(*contract, *claimer))
    }

    /// `true` if `claimer` has not yet claimed through `contract` in the
    /// interval a claim at `block` lands in.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    pub fn claimer_can_claim(
        &self,
        settings: &dyn RewardsSettings,
        contract: &Address,
        claimer: &Address,
        block: BlockNumber,
    ) -> Result<bool> {
        let block_start = self.projected_block_start(settings, block)?;
        Ok(!self.has_claimed(block_start, contract, claimer))
    }

    /// Interval total snapshotted at the last rollover.
    pub fn interval_total(&self) -> U256 {
        self.interval_total
    }

    /// Sum of the claimer fractions `contract` has paid out in the live
    /// interval.
    pub fn claimed_percentage(&self, contract: &Address) -> U256 {
        self.interval_claimed_perc
            .get(contract)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// The claimer share table `contract` fixed for the interval starting at
    /// `block_start`, if it has claimed in that interval.
    pub fn claimer_shares(
        &self,
        contract: &Address,
        block_start: BlockNumber,
    ) -> Option<&BTreeMap<Address, U256>> {
        self.claimer_shares
            .get(contract)
            .filter(|table| table.block_start == block_start)
            .map(|table| &table.shares)
    }

    /// `claimer`'s fraction of `contract`'s share for a claim at `block`.
    ///
    /// Uses the table fixed at the contract's first claim in that interval;
    /// before that claim the table is built by `current`.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::InvalidInterval`] if the configured interval is zero
    /// - any error returned by `current`
    pub fn claimer_share<F>(
        &self,
        settings: &dyn RewardsSettings,
        contract: &Address,
        claimer: &Address,
        block: BlockNumber,
        current: F,
    ) -> Result<U256>
    where
        F: FnOnce() -> Result<BTreeMap<Address, U256>>,
    {
        let block_start = self.projected_block_start(settings, block)?;
        let share = match self.claimer_shares(contract, block_start) {
            Some(shares) => shares.get(claimer).copied(),
            None => current()?.get(claimer).copied(),
        };
        Ok(share.unwrap_or(U256::ZERO))
    }

    /// Pay `claimer` its entry in the calling contract's claimer share table.
    ///
    /// The first successful claim through a contract in an interval fixes
    /// the table built by `current`. Later claims in the same interval use
    /// that table, so stake or membership changes mid-interval cannot hand
    /// out more than the contract's share.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotClaimable`] if `claimer` has no entry in the table
    /// - any error returned by `current`
    /// - any error of [`RewardsPool::claim`]
    pub fn claim_with_shares<F>(
        &mut self,
        ctx: &CallContext,
        env: &mut PoolEnv<'_>,
        claimer: Address,
        current: F,
    ) -> Result<ClaimReceipt>
    where
        F: FnOnce() -> Result<BTreeMap<Address, U256>>,
    {
        let contract = ctx.sender;
        let block_start = self.projected_block_start(env.settings, ctx.block)?;
        let shares = match self.claimer_shares(&contract, block_start) {
            Some(shares) => shares.clone(),
            None => current()?,
        };
        let claimer_perc = shares.get(&claimer).copied().unwrap_or(U256::ZERO);
        if claimer_perc.is_zero() {
            return Err(RewardsError::NotClaimable(format!(
                "{claimer} has no share of {contract} in the interval starting at block {block_start}"
            )));
        }

        let receipt = self.claim(ctx, env, claimer, claimer_perc)?;
        self.claimer_shares
            .insert(contract, ClaimerShares { block_start, shares });
        Ok(receipt)
    }

    /// Pay `claimer` its share of the interval rewards.
    ///
    /// `ctx.sender` is the calling claiming contract; it must resolve to a
    /// registered name with a non-zero share. While the live interval is
    /// current either the configured or the snapshotted share will do; the
    /// payout always uses the snapshot.
    ///
    /// # Errors
    ///
    /// - [`RewardsError::NotLatestContract`] if this pool has been upgraded away
    /// - [`RewardsError::Unauthorized`] if the caller has no share
    /// - [`RewardsError::InvalidPercentage`] if `claimer_perc` or the caller's share is out of range
    /// - [`RewardsError::ZeroAddress`] if `claimer` is zero
    /// - [`RewardsError::AlreadyClaimed`] on a second claim in the same interval
    /// - [`RewardsError::ShareExhausted`] if the contract's claimer fractions would pass 100%
    /// - [`RewardsError::NotEntitled`] if the computed amount is zero
    /// - [`RewardsError::Ledger`] if minting, depositing or withdrawing fails
    pub fn claim(
        &mut self,
        ctx: &CallContext,
        env: &mut PoolEnv<'_>,
        claimer: Address,
        claimer_perc: U256,
    ) -> Result<ClaimReceipt> {
        let contract = ctx.sender;
        let (settings, registry) = (env.settings, env.registry);
        let blocks = settings.claim_interval_blocks();
        let passed = intervals_passed(self.block_start, blocks, ctx.block)?;

        // 0. Authorization by configuration.
        if !registry.is_latest(names::REWARDS_POOL, &self.address) {
            return Err(RewardsError::NotLatestContract(self.address));
        }
        let Some(contract_name) = registry.name_of(&contract) else {
            return Err(RewardsError::Unauthorized(format!(
                "{contract} is not a registered contract"
            )));
        };
        let live_perc = settings.claim_percentage(contract_name);
        let effective_perc = if passed > 0 {
            live_perc
        } else {
            self.snapshot_percentage(&contract)
        };
        if live_perc.is_zero() && effective_perc.is_zero() {
            return Err(RewardsError::Unauthorized(format!(
                "'{contract_name}' has no share of the rewards pool"
            )));
        }

        // 1-3. Claim arguments.
        if !is_valid_percentage(claimer_perc) {
            return Err(RewardsError::InvalidPercentage(claimer_perc));
        }
        if claimer.is_zero() {
            return Err(RewardsError::ZeroAddress);
        }
        let block_start = rolled_block_start(self.block_start, blocks, passed)?;
        if self.has_claimed(block_start, &contract, &claimer) {
            return Err(RewardsError::AlreadyClaimed {
                contract,
                claimer,
                block_start,
            });
        }
        let already = if passed > 0 {
            U256::ZERO
        } else {
            self.claimed_percentage(&contract)
        };
        let claimed_perc = already
            .checked_add(claimer_perc)
            .filter(|total| *total <= BASE)
            .ok_or(RewardsError::ShareExhausted {
                contract,
                claimed: already,
                requested: claimer_perc,
            })?;

        // 4. Roll the interval forward and re-snapshot.
        let mut events = Vec::new();
        let mut interval_total = self.interval_total;
        let mut rolled_perc = None;
        if passed > 0 {
            if !is_valid_percentage(effective_perc) {
                return Err(RewardsError::InvalidPercentage(effective_perc));
            }
            if let Some(minted) = self.mint_inflation(ctx.block, env)? {
                events.push(minted);
            }
            interval_total = env
                .vault
                .balance_of(names::REWARDS_POOL, &env.token.address());

            let mut snapshot = snapshot_percentages(settings, registry);
            snapshot.insert(contract, effective_perc);
            rolled_perc = Some(snapshot);

            tracing::info!(
                previous_start = self.block_start,
                block_start,
                passed,
                %interval_total,
                "claim interval rolled"
            );
            events.push(PoolEvent::IntervalRolled {
                block_start,
                intervals_passed: passed,
                interval_total,
            });
        }

        // 5-6. Entitlement.
        let amount = entitlement(effective_perc, claimer_perc, interval_total)?;
        if amount.is_zero() {
            return Err(RewardsError::NotEntitled { contract, claimer });
        }

        // 7. Pay out.
        env.vault
            .withdraw(&mut *env.token, names::REWARDS_POOL, claimer, amount)?;

        // 8. Commit.
        if let Some(snapshot) = rolled_perc {
            self.block_start = block_start;
            self.interval_total = interval_total;
            self.interval_perc = snapshot;
            self.interval_claimed_perc.clear();
        }
        self.interval_claimed_perc.insert(contract, claimed_perc);
        self.claimed.insert((block_start, contract, claimer));
        self.claimed_ever.insert((contract, claimer));
        self.block_last = ctx.block;

        tracing::info!(
            contract = contract_name,
            %claimer,
            %amount,
            block_start,
            "rewards claimed"
        );

        // 9. Emit.
        events.push(PoolEvent::RewardsClaimed {
            contract,
            claimer,
            amount,
            timestamp: ctx.timestamp,
        });
        Ok(ClaimReceipt { amount, events })
    }

    fn snapshot_percentage(&self, contract: &Address) -> U256 {
        self.interval_perc
            .get(contract)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Mint pending token inflation to the pool and deposit it in the vault.
    fn mint_inflation(
        &self,
        block: BlockNumber,
        env: &mut PoolEnv<'_>,
    ) -> Result<Option<PoolEvent>> {
        if env.token.pending_inflation_intervals_elapsed(block) == 0 {
            return Ok(None);
        }
        let minted = env.token.mint_pending_inflation(block, self.address)?;
        if minted.is_zero() {
            return Ok(None);
        }
        let vault_address = env.vault.address();
        env.token.approve(self.address, vault_address, minted)?;
        env.vault
            .deposit(&mut *env.token, names::REWARDS_POOL, self.address, minted)?;

        tracing::debug!(%minted, block, "inflation deposited to rewards pool");
        Ok(Some(PoolEvent::InflationMinted {
            amount: minted,
            block,
        }))
    }
}

/// Share configured in settings for the name `contract` is registered under.
fn live_percentage(
    settings: &dyn RewardsSettings,
    registry: &ContractRegistry,
    contract: &Address,
) -> U256 {
    registry
        .name_of(contract)
        .map(|name| settings.claim_percentage(name))
        .unwrap_or(U256::ZERO)
}

/// Shares of every configured claimer that resolves to a registered address.
fn snapshot_percentages(
    settings: &dyn RewardsSettings,
    registry: &ContractRegistry,
) -> BTreeMap<Address, U256> {
    settings
        .claimers()
        .iter()
        .filter_map(|name| {
            registry
                .address_of(name)
                .map(|address| (address, settings.claim_percentage(name)))
        })
        .collect()
}
