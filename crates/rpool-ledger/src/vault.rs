//! Token custody on behalf of named clients.
//!
//! The vault physically holds tokens at its own address and keeps a
//! per-(client, token) balance. Deposits pull tokens before crediting;
//! withdrawals check the client balance, send the tokens, then debit.

use std::collections::HashMap;

use rpool_types::{Address, U256};

use crate::token::TokenLedger;
use crate::{LedgerError, Result};

/// Custody operations the core relies on.
pub trait Vault {
    /// The vault's own address; the token spender for deposits.
    fn address(&self) -> Address;

    /// Balance of `token` held for `client`.
    fn balance_of(&self, client: &str, token: &Address) -> U256;

    /// Pull `amount` from `from` and credit it to `client`. `from` must have
    /// approved the vault.
    fn deposit(
        &mut self,
        token: &mut dyn TokenLedger,
        client: &str,
        from: Address,
        amount: U256,
    ) -> Result<()>;

    /// Debit `client` and send `amount` to `to`.
    fn withdraw(
        &mut self,
        token: &mut dyn TokenLedger,
        client: &str,
        to: Address,
        amount: U256,
    ) -> Result<()>;

    /// Move a balance between two clients without touching the token.
    fn transfer(
        &mut self,
        token: &Address,
        from_client: &str,
        to_client: &str,
        amount: U256,
    ) -> Result<()>;
}

/// In-memory vault.
#[derive(Clone, Debug)]
pub struct TokenVault {
    address: Address,
    balances: HashMap<(String, Address), U256>,
}

impl TokenVault {
    /// Create an empty vault at `address`.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            balances: HashMap::new(),
        }
    }

    /// Rebuild a vault from persisted client balances.
    pub fn from_parts(address: Address, balances: HashMap<(String, Address), U256>) -> Self {
        Self { address, balances }
    }

    /// Every non-zero client balance as `((client, token), amount)`.
    pub fn balances(&self) -> impl Iterator<Item = (&(String, Address), &U256)> {
        self.balances.iter()
    }

    fn checked_debit(&self, client: &str, token: &Address, amount: U256) -> Result<U256> {
        let available = self.balance_of(client, token);
        available
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientVaultBalance {
                client: client.to_string(),
                available,
                required: amount,
            })
    }

    fn set_balance(&mut self, client: &str, token: Address, amount: U256) {
        let key = (client.to_string(), token);
        if amount.is_zero() {
            self.balances.remove(&key);
        } else {
            self.balances.insert(key, amount);
        }
    }
}

impl Vault for TokenVault {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, client: &str, token: &Address) -> U256 {
        self.balances
            .get(&(client.to_string(), *token))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn deposit(
        &mut self,
        token: &mut dyn TokenLedger,
        client: &str,
        from: Address,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let token_address = token.address();
        let credited = self
            .balance_of(client, &token_address)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow("vault balance"))?;

        token.transfer_from(self.address, from, self.address, amount)?;
        self.set_balance(client, token_address, credited);

        tracing::debug!(client, %amount, %from, "vault deposit");
        Ok(())
    }

    fn withdraw(
        &mut self,
        token: &mut dyn TokenLedger,
        client: &str,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let token_address = token.address();
        let remaining = self.checked_debit(client, &token_address, amount)?;

        token.transfer(self.address, to, amount)?;
        self.set_balance(client, token_address, remaining);

        tracing::debug!(client, %amount, %to, "vault withdrawal");
        Ok(())
    }

    fn transfer(
        &mut self,
        token: &Address,
        from_client: &str,
        to_client: &str,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        let remaining = self.checked_debit(from_client, token, amount)?;
        let credited = self
            .balance_of(to_client, token)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow("vault balance"))?;

        self.set_balance(from_client, *token, remaining);
        self.set_balance(to_client, *token, credited);
        Ok(())
    }
}
