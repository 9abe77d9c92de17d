//! Raw access to the `storage` table.

use rusqlite::{Connection, OptionalExtension};

use crate::keys::StorageKey;
use crate::{DbError, Result};

/// Insert or replace the value at `key`.
pub fn put(conn: &Connection, key: &StorageKey, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO storage (key, name, params, value) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![key.hash()?.as_slice(), key.name(), key.params_json()?, value],
    )?;
    Ok(())
}

/// Value at `key`, if present.
pub fn get(conn: &Connection, key: &StorageKey) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM storage WHERE key = ?1",
            [key.hash()?.as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Value at `key`, or [`DbError::NotFound`].
pub fn require(conn: &Connection, key: &StorageKey) -> Result<String> {
    get(conn, key)?.ok_or_else(|| DbError::NotFound(key.name().to_string()))
}

/// Every `(params, value)` row stored under `name`.
pub fn entries(conn: &Connection, name: &str) -> Result<Vec<(Vec<String>, String)>> {
    let mut stmt = conn.prepare("SELECT params, value FROM storage WHERE name = ?1")?;
    let rows = stmt
        .query_map([name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(params, value)| {
            let params: Vec<String> = serde_json::from_str(&params)
                .map_err(|e| DbError::Corrupt(format!("{name} params: {e}")))?;
            Ok((params, value))
        })
        .collect()
}

/// Remove every row.
pub fn clear(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM storage", [])?;
    Ok(())
}

/// Take exactly `N` parameters from a row stored under `name`.
pub fn params<const N: usize>(name: &str, params: Vec<String>) -> Result<[String; N]> {
    let len = params.len();
    params
        .try_into()
        .map_err(|_| DbError::Corrupt(format!("{name}: expected {N} params, got {len}")))
}
