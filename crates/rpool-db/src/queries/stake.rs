//! Stake ledger persistence.

use std::collections::BTreeMap;

use rusqlite::Connection;

use rpool_stake::StakeLedger;
use rpool_types::Address;

use crate::keys::{decode_address, decode_amount, encode_address, encode_amount, names, StorageKey};
use crate::store;
use crate::{DbError, Result};

/// Write the aggregate and every node's stake.
pub fn save(conn: &Connection, ledger: &StakeLedger) -> Result<()> {
    store::put(
        conn,
        &StorageKey::new(names::STAKE_TOTAL),
        &encode_amount(&ledger.total_stake()),
    )?;
    for (node, stake) in ledger.node_stakes() {
        let key = StorageKey::new(names::STAKE_NODE).param(encode_address(node));
        store::put(conn, &key, &encode_amount(stake))?;
    }
    Ok(())
}

/// Rebuild the ledger at `address`.
///
/// The stored total must equal the sum of the stored node stakes.
pub fn load(conn: &Connection, address: Address) -> Result<StakeLedger> {
    let mut node_stakes = BTreeMap::new();
    for (params, value) in store::entries(conn, names::STAKE_NODE)? {
        let [node] = store::params::<1>(names::STAKE_NODE, params)?;
        node_stakes.insert(decode_address(&node)?, decode_amount(&value)?);
    }
    let ledger = StakeLedger::from_parts(address, node_stakes)
        .map_err(|e| DbError::Corrupt(e.to_string()))?;

    let stored_total = decode_amount(&store::require(
        conn,
        &StorageKey::new(names::STAKE_TOTAL),
    )?)?;
    if stored_total != ledger.total_stake() {
        return Err(DbError::Corrupt(format!(
            "stake total {stored_total} does not match node stakes {}",
            ledger.total_stake()
        )));
    }
    Ok(ledger)
}
