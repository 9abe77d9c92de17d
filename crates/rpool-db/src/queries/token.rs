//! Reference token persistence. Allowances are not stored.

use std::collections::HashMap;

use rusqlite::Connection;

use rpool_ledger::{InflationSchedule, InflationToken, TokenLedger};

use crate::keys::{
    decode_address, decode_amount, decode_block, encode_address, encode_amount, names, StorageKey,
};
use crate::store;
use crate::{DbError, Result};

/// Write address, balances, supply and the inflation schedule.
pub fn save(conn: &Connection, token: &InflationToken) -> Result<()> {
    store::put(
        conn,
        &StorageKey::new(names::TOKEN_ADDRESS),
        &encode_address(&token.address()),
    )?;
    store::put(
        conn,
        &StorageKey::new(names::TOKEN_SUPPLY),
        &encode_amount(&token.total_supply()),
    )?;
    let schedule = serde_json::to_string(token.schedule())
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    store::put(conn, &StorageKey::new(names::TOKEN_SCHEDULE), &schedule)?;
    store::put(
        conn,
        &StorageKey::new(names::TOKEN_LAST_MINT),
        &token.last_mint_block().to_string(),
    )?;
    for (holder, balance) in token.balances() {
        if balance.is_zero() {
            continue;
        }
        let key = StorageKey::new(names::TOKEN_BALANCE).param(encode_address(holder));
        store::put(conn, &key, &encode_amount(balance))?;
    }
    Ok(())
}

/// Rebuild the token. The stored supply must equal the sum of balances.
pub fn load(conn: &Connection) -> Result<InflationToken> {
    let address = decode_address(&store::require(conn, &StorageKey::new(names::TOKEN_ADDRESS))?)?;
    let schedule: InflationSchedule = serde_json::from_str(&store::require(
        conn,
        &StorageKey::new(names::TOKEN_SCHEDULE),
    )?)
    .map_err(|e| DbError::Corrupt(format!("inflation schedule: {e}")))?;
    let last_mint = decode_block(&store::require(
        conn,
        &StorageKey::new(names::TOKEN_LAST_MINT),
    )?)?;

    let mut balances = HashMap::new();
    for (params, value) in store::entries(conn, names::TOKEN_BALANCE)? {
        let [holder] = store::params::<1>(names::TOKEN_BALANCE, params)?;
        balances.insert(decode_address(&holder)?, decode_amount(&value)?);
    }

    let token = InflationToken::from_parts(address, schedule, last_mint, balances)
        .map_err(|e| DbError::Corrupt(e.to_string()))?;
    let stored_supply = decode_amount(&store::require(
        conn,
        &StorageKey::new(names::TOKEN_SUPPLY),
    )?)?;
    if stored_supply != token.total_supply() {
        return Err(DbError::Corrupt(format!(
            "token supply {stored_supply} does not match balances {}",
            token.total_supply()
        )));
    }
    Ok(token)
}
