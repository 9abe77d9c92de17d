//! Forward-only schema migrations keyed on `PRAGMA user_version`.
//!
//! Each step runs in its own transaction together with the version bump, so
//! a crash mid-migration leaves the database at the previous version.

use rusqlite::Connection;

use crate::{schema, DbError, Result, SCHEMA_VERSION};

/// Migration steps in version order. Step `n` takes the database from
/// version `n - 1` to `n`.
const STEPS: &[(u32, &str)] = &[(1, schema::SCHEMA_V1)];

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// # Errors
///
/// - [`DbError::Migration`] if the database was written by a newer schema
/// - [`DbError::Migration`] if no step reaches the current version
/// - [`DbError::Sqlite`] if a step fails
pub fn run(conn: &Connection) -> Result<()> {
    let found = user_version(conn)?;
    if found > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema v{found} is newer than supported v{SCHEMA_VERSION}"
        )));
    }

    for &(version, sql) in STEPS.iter().filter(|(version, _)| *version > found) {
        tracing::info!(from = found, to = version, "applying storage migration");
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    let reached = user_version(conn)?;
    if reached != SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "schema stopped at v{reached}, expected v{SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

fn user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
