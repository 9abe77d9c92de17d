//! Reference vault persistence.

use std::collections::HashMap;

use rusqlite::Connection;

use rpool_ledger::{TokenVault, Vault};

use crate::keys::{decode_address, decode_amount, encode_address, encode_amount, names, StorageKey};
use crate::store;
use crate::Result;

/// Write the vault address and every client balance.
pub fn save(conn: &Connection, vault: &TokenVault) -> Result<()> {
    store::put(
        conn,
        &StorageKey::new(names::VAULT_ADDRESS),
        &encode_address(&vault.address()),
    )?;
    for ((client, token), balance) in vault.balances() {
        if balance.is_zero() {
            continue;
        }
        let key = StorageKey::new(names::VAULT_BALANCE)
            .param(client.clone())
            .param(encode_address(token));
        store::put(conn, &key, &encode_amount(balance))?;
    }
    Ok(())
}

/// Rebuild the vault.
pub fn load(conn: &Connection) -> Result<TokenVault> {
    let address = decode_address(&store::require(conn, &StorageKey::new(names::VAULT_ADDRESS))?)?;
    let mut balances = HashMap::new();
    for (params, value) in store::entries(conn, names::VAULT_BALANCE)? {
        let [client, token] = store::params::<2>(names::VAULT_BALANCE, params)?;
        balances.insert((client, decode_address(&token)?), decode_amount(&value)?);
    }
    Ok(TokenVault::from_parts(address, balances))
}
