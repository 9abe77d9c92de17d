//! Inflationary fungible token.
//!
//! A standard balance/allowance token whose supply compounds once per
//! inflation interval. Pending inflation accrues lazily: nothing changes
//! until [`TokenLedger::mint_pending_inflation`] is called, which mints every
//! whole elapsed interval at once and advances the last-mint block by an
//! exact multiple of the interval length.
//!
//! ## Formula
//!
//! ```text
//! supply_{i+1} = supply_i * rate_per_interval / BASE
//! pending      = supply_n - supply_0
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rpool_types::{mul_div, Address, BlockNumber, BASE, U256};

use crate::{LedgerError, Result};

/// Token operations the stake ledger, vault and rewards pool rely on.
pub trait TokenLedger {
    /// The token's own address.
    fn address(&self) -> Address;

    /// Balance held by `owner`.
    fn balance_of(&self, owner: &Address) -> U256;

    /// Current total supply.
    fn total_supply(&self) -> U256;

    /// Amount `spender` may still pull from `owner`.
    fn allowance(&self, owner: &Address, spender: &Address) -> U256;

    /// Move `amount` from `from` to `to`.
    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<()>;

    /// Set the allowance of `spender` over `owner`'s balance.
    fn approve(&mut self, owner: Address, spender: Address, amount: U256) -> Result<()>;

    /// Pull `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()>;

    /// Whole inflation intervals elapsed since the last mint.
    fn pending_inflation_intervals_elapsed(&self, block: BlockNumber) -> u64;

    /// Tokens that would be minted if inflation were minted at `block`.
    fn pending_inflation(&self, block: BlockNumber) -> Result<U256>;

    /// Mint pending inflation to `to`, returning the minted amount.
    fn mint_pending_inflation(&mut self, block: BlockNumber, to: Address) -> Result<U256>;
}

/// Inflation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflationSchedule {
    /// Supply multiplier per interval, scaled by BASE. BASE disables inflation.
    pub rate_per_interval: U256,
    /// Interval length in blocks.
    pub interval_blocks: u64,
    /// Block at which inflation starts accruing.
    pub start_block: BlockNumber,
}

impl InflationSchedule {
    /// A schedule that never mints.
    pub fn disabled() -> Self {
        Self {
            rate_per_interval: BASE,
            interval_blocks: 1,
            start_block: 0,
        }
    }
}

/// In-memory inflationary token.
#[derive(Clone, Debug)]
pub struct InflationToken {
    address: Address,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
    schedule: InflationSchedule,
    last_mint_block: BlockNumber,
}

impl InflationToken {
    /// Create a token with the genesis supply held by `treasury`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidSetting`] if the schedule's interval is zero or its rate below BASE
    pub fn new(
        address: Address,
        treasury: Address,
        genesis_supply: U256,
        schedule: InflationSchedule,
    ) -> Result<Self> {
        if schedule.interval_blocks == 0 {
            return Err(LedgerError::InvalidSetting(
                "inflation interval must be at least one block".to_string(),
            ));
        }
        if schedule.rate_per_interval < BASE {
            return Err(LedgerError::InvalidSetting(format!(
                "inflation rate {} is below 1.0",
                schedule.rate_per_interval
            )));
        }

        let mut balances = HashMap::new();
        if !genesis_supply.is_zero() {
            balances.insert(treasury, genesis_supply);
        }
        let last_mint_block = schedule.start_block;
        Ok(Self {
            address,
            balances,
            allowances: HashMap::new(),
            total_supply: genesis_supply,
            schedule,
            last_mint_block,
        })
    }

    /// The inflation schedule.
    pub fn schedule(&self) -> &InflationSchedule {
        &self.schedule
    }

    /// Block up to which inflation has been minted.
    pub fn last_mint_block(&self) -> BlockNumber {
        self.last_mint_block
    }

    /// Every non-zero balance.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }

    /// Rebuild a token from persisted parts. Allowances are not persisted.
    pub fn from_parts(
        address: Address,
        schedule: InflationSchedule,
        last_mint_block: BlockNumber,
        balances: HashMap<Address, U256>,
    ) -> Result<Self> {
        let total_supply = balances
            .values()
            .try_fold(U256::ZERO, |acc, b| acc.checked_add(*b))
            .ok_or(LedgerError::Overflow("token supply"))?;
        Ok(Self {
            address,
            balances,
            allowances: HashMap::new(),
            total_supply,
            schedule,
            last_mint_block,
        })
    }

    fn debit(&mut self, account: Address, amount: U256) -> Result<()> {
        let available = self.balance_of(&account);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                account,
                available,
                required: amount,
            })?;
        if remaining.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, remaining);
        }
        Ok(())
    }

    fn credit(&mut self, account: Address, amount: U256) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self
            .balance_of(&account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow("token balance"))?;
        self.balances.insert(account, balance);
        Ok(())
    }
}

impl TokenLedger for InflationToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or(U256::ZERO)
    }

    fn total_supply(&self) -> U256 {
        self.total_supply
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
        if to.is_zero() {
            return Err(LedgerError::InvalidAddress(
                "cannot transfer to the zero address".to_string(),
            ));
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: U256) -> Result<()> {
        if spender.is_zero() {
            return Err(LedgerError::InvalidAddress(
                "cannot approve the zero address".to_string(),
            ));
        }
        self.allowances.insert((owner, spender), amount);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let available = self.allowance(&from, &spender);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientAllowance {
                owner: from,
                spender,
                available,
                required: amount,
            })?;
        self.transfer(from, to, amount)?;
        self.allowances.insert((from, spender), remaining);
        Ok(())
    }

    fn pending_inflation_intervals_elapsed(&self, block: BlockNumber) -> u64 {
        if block <= self.last_mint_block {
            return 0;
        }
        (block - self.last_mint_block) / self.schedule.interval_blocks
    }

    fn pending_inflation(&self, block: BlockNumber) -> Result<U256> {
        let intervals = self.pending_inflation_intervals_elapsed(block);
        if intervals == 0 || self.schedule.rate_per_interval == BASE {
            return Ok(U256::ZERO);
        }

        // rate^intervals by squaring, in BASE fixed point.
        let mut factor = BASE;
        let mut power = self.schedule.rate_per_interval;
        let mut remaining = intervals;
        while remaining > 0 {
            if remaining & 1 == 1 {
                factor = mul_div(factor, power, BASE).ok_or(LedgerError::Overflow("inflation"))?;
            }
            remaining >>= 1;
            if remaining > 0 {
                power = mul_div(power, power, BASE).ok_or(LedgerError::Overflow("inflation"))?;
            }
        }
        mul_div(self.total_supply, factor, BASE)
            .and_then(|supply| supply.checked_sub(self.total_supply))
            .ok_or(LedgerError::Overflow("inflation"))
    }

    fn mint_pending_inflation(&mut self, block: BlockNumber, to: Address) -> Result<U256> {
        let intervals = self.pending_inflation_intervals_elapsed(block);
        if intervals == 0 {
            return Ok(U256::ZERO);
        }
        let minted = self.pending_inflation(block)?;

        self.credit(to, minted)?;
        self.total_supply = self
            .total_supply
            .checked_add(minted)
            .ok_or(LedgerError::Overflow("token supply"))?;
        self.last_mint_block += intervals * self.schedule.interval_blocks;

        tracing::debug!(
            %minted,
            intervals,
            last_mint_block = self.last_mint_block,
            "inflation minted"
        );

        Ok(minted)
    }
}
