//! SQL schema definitions.

/// Complete schema for the v1 database.
///
/// Every piece of deployment state is one row. `key` is the BLAKE3 storage
/// key of `name` and `params`; the other columns keep rows inspectable.
pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS storage (
    key BLOB PRIMARY KEY,
    name TEXT NOT NULL,
    params TEXT NOT NULL,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_storage_name ON storage(name);
"#;
