//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the progress database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    entries_found INTEGER,
    failed_count INTEGER
);

-- Single-row resume point
CREATE TABLE IF NOT EXISTS checkpoint (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    last_query TEXT,
    phase TEXT NOT NULL,
    resuming INTEGER NOT NULL DEFAULT 0,
    config_hash TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Accumulated entries; alt_code is '' when absent so the unique index holds
CREATE TABLE IF NOT EXISTS entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    alt_code TEXT NOT NULL DEFAULT '',
    name TEXT NOT NULL,
    found_at TEXT NOT NULL,
    UNIQUE(code, alt_code, name)
);

CREATE INDEX IF NOT EXISTS idx_entries_code ON entries(code);

-- Queries whose retry budget ran out
CREATE TABLE IF NOT EXISTS failed_queries (
    query TEXT PRIMARY KEY,
    recorded_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
