//! Rewards pool persistence.

use rusqlite::Connection;

use rpool_rewards::{ClaimerShares, RewardsPool, RewardsPoolParts};
use rpool_types::Address;

use crate::keys::{
    decode_address, decode_amount, decode_block, encode_address, encode_amount, names, StorageKey,
};
use crate::store;
use crate::{DbError, Result};

const FLAG: &str = "1";

/// Write interval bounds, the snapshot, claimer share tables and claim flags.
pub fn save(conn: &Connection, pool: &RewardsPool) -> Result<()> {
    let parts = pool.to_parts();
    store::put(
        conn,
        &StorageKey::new(names::INTERVAL_BLOCK_START),
        &parts.block_start.to_string(),
    )?;
    store::put(
        conn,
        &StorageKey::new(names::INTERVAL_BLOCK_LAST),
        &parts.block_last.to_string(),
    )?;
    store::put(
        conn,
        &StorageKey::new(names::INTERVAL_TOTAL),
        &encode_amount(&parts.interval_total),
    )?;
    for (contract, perc) in &parts.interval_perc {
        let key = StorageKey::new(names::INTERVAL_CONTRACT_PERC).param(encode_address(contract));
        store::put(conn, &key, &encode_amount(perc))?;
    }
    for (contract, perc) in &parts.interval_claimed_perc {
        let key =
            StorageKey::new(names::INTERVAL_CONTRACT_CLAIMED).param(encode_address(contract));
        store::put(conn, &key, &encode_amount(perc))?;
    }
    for (contract, table) in &parts.claimer_shares {
        for (claimer, share) in &table.shares {
            let key = StorageKey::new(names::CLAIMER_SHARE)
                .param(encode_address(contract))
                .param(table.block_start.to_string())
                .param(encode_address(claimer));
            store::put(conn, &key, &encode_amount(share))?;
        }
    }
    for (block_start, contract, claimer) in &parts.claimed {
        let key = StorageKey::new(names::INTERVAL_CLAIMED)
            .param(block_start.to_string())
            .param(encode_address(contract))
            .param(encode_address(claimer));
        store::put(conn, &key, FLAG)?;
    }
    for (contract, claimer) in &parts.claimed_ever {
        let key = StorageKey::new(names::CLAIMED_EVER)
            .param(encode_address(contract))
            .param(encode_address(claimer));
        store::put(conn, &key, FLAG)?;
    }
    Ok(())
}

/// Rebuild the pool at `address`.
pub fn load(conn: &Connection, address: Address) -> Result<RewardsPool> {
    let mut parts = RewardsPoolParts {
        block_start: decode_block(&store::require(
            conn,
            &StorageKey::new(names::INTERVAL_BLOCK_START),
        )?)?,
        block_last: decode_block(&store::require(
            conn,
            &StorageKey::new(names::INTERVAL_BLOCK_LAST),
        )?)?,
        interval_total: decode_amount(&store::require(
            conn,
            &StorageKey::new(names::INTERVAL_TOTAL),
        )?)?,
        ..RewardsPoolParts::default()
    };

    for (params, value) in store::entries(conn, names::INTERVAL_CONTRACT_PERC)? {
        let [contract] = store::params::<1>(names::INTERVAL_CONTRACT_PERC, params)?;
        parts
            .interval_perc
            .insert(decode_address(&contract)?, decode_amount(&value)?);
    }
    for (params, value) in store::entries(conn, names::INTERVAL_CONTRACT_CLAIMED)? {
        let [contract] = store::params::<1>(names::INTERVAL_CONTRACT_CLAIMED, params)?;
        parts
            .interval_claimed_perc
            .insert(decode_address(&contract)?, decode_amount(&value)?);
    }
    for (params, value) in store::entries(conn, names::CLAIMER_SHARE)? {
        let [contract, block_start, claimer] = store::params::<3>(names::CLAIMER_SHARE, params)?;
        let contract = decode_address(&contract)?;
        let block_start = decode_block(&block_start)?;
        let table = parts
            .claimer_shares
            .entry(contract)
            .or_insert_with(|| ClaimerShares {
                block_start,
                shares: Default::default(),
            });
        if table.block_start != block_start {
            return Err(DbError::Corrupt(format!(
                "claimer shares of {contract} stored for intervals {} and {block_start}",
                table.block_start
            )));
        }
        table
            .shares
            .insert(decode_address(&claimer)?, decode_amount(&value)?);
    }
    for (params, _) in store::entries(conn, names::INTERVAL_CLAIMED)? {
        let [block_start, contract, claimer] = store::params::<3>(names::INTERVAL_CLAIMED, params)?;
        parts.claimed.insert((
            decode_block(&block_start)?,
            decode_address(&contract)?,
            decode_address(&claimer)?,
        ));
    }
    for (params, _) in store::entries(conn, names::CLAIMED_EVER)? {
        let [contract, claimer] = store::params::<2>(names::CLAIMED_EVER, params)?;
        parts
            .claimed_ever
            .insert((decode_address(&contract)?, decode_address(&claimer)?));
    }

    Ok(RewardsPool::from_parts(address, parts))
}
