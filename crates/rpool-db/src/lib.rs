//! # rpool-db
//!
//! SQLite persistence for a [`LocalDeployment`].
//!
//! ## Schema
//!
//! - One `storage` table of key/value rows
//! - Keys are domain-separated BLAKE3 hashes of a semantic name and its
//!   identifying parameters (see [`keys`])
//! - Amounts are decimal strings, never SQLite integers
//! - WAL mode; schema version stored in `PRAGMA user_version`

pub mod keys;
pub mod migrations;
pub mod queries;
pub mod schema;
pub mod store;

use rusqlite::Connection;
use std::path::Path;

use rpool_engine::{DeploymentParts, LocalDeployment};
use rpool_ledger::DaoSettings;
use rpool_types::{names, Address};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt value: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deployment rejected stored state: {0}")]
    Engine(#[from] rpool_engine::EngineError),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Pragmas applied to every connection. In-memory databases report
/// `memory` rather than `wal` for the journal mode.
const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;";

/// Open or create the database at `path` and migrate it.
pub fn open(path: &Path) -> Result<Connection> {
    prepare(Connection::open(path)?)
}

/// Open a migrated in-memory database.
pub fn open_memory() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection> {
    conn.execute_batch(PRAGMAS)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Replace the stored state with `deployment` in one transaction.
pub fn save_deployment(conn: &mut Connection, deployment: &LocalDeployment) -> Result<()> {
    let tx = conn.transaction()?;
    store::clear(&tx)?;
    queries::registry::save(&tx, deployment.registry())?;
    queries::token::save(&tx, deployment.token())?;
    queries::vault::save(&tx, deployment.vault())?;
    queries::stake::save(&tx, deployment.stake_ledger())?;
    queries::rewards::save(&tx, deployment.pool())?;
    tx.commit()?;

    tracing::debug!(
        total_stake = %deployment.total_stake(),
        block_start = deployment.claim_interval_block_start(),
        "deployment saved"
    );
    Ok(())
}

/// `true` if a deployment has been saved.
pub fn has_deployment(conn: &Connection) -> Result<bool> {
    Ok(store::get(conn, &keys::StorageKey::new(keys::names::INTERVAL_BLOCK_START))?.is_some())
}

/// Load the stored deployment, if any.
///
/// Settings and the treasury are not stored; they come from the caller.
pub fn load_deployment(
    conn: &Connection,
    settings: DaoSettings,
    treasury: Address,
) -> Result<Option<LocalDeployment>> {
    if !has_deployment(conn)? {
        return Ok(None);
    }

    let registry = queries::registry::load(conn)?;
    let stake_address = registry
        .address_of(names::STAKE_LEDGER)
        .ok_or_else(|| DbError::NotFound(names::STAKE_LEDGER.to_string()))?;
    let pool_address = registry
        .address_of(names::REWARDS_POOL)
        .ok_or_else(|| DbError::NotFound(names::REWARDS_POOL.to_string()))?;

    let parts = DeploymentParts {
        stake: queries::stake::load(conn, stake_address)?,
        pool: queries::rewards::load(conn, pool_address)?,
        token: queries::token::load(conn)?,
        vault: queries::vault::load(conn)?,
        registry,
        settings,
        treasury,
    };
    let deployment = LocalDeployment::from_parts(parts)?;

    tracing::info!(
        total_stake = %deployment.total_stake(),
        block_start = deployment.claim_interval_block_start(),
        nodes = deployment.registry().node_count(),
        "deployment restored"
    );
    Ok(Some(deployment))
}
