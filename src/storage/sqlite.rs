//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ProgressStore trait.

use crate::catalog::Entry;
use crate::harvest::CandidateQuery;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ProgressStore, StorageError, StorageResult};
use crate::storage::{Checkpoint, HarvestPhase, RunRecord, RunStatus};
use crate::HarvestError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(HarvestError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // FULL sync: a saved checkpoint must survive a crash
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(RunStatus::Running),
            entries_found: row.get::<_, Option<i64>>(5)?.map(|n| n as u64),
            failed_count: row.get::<_, Option<i64>>(6)?.map(|n| n as u64),
        })
    }
}

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, entries_found, failed_count";

impl ProgressStore for SqliteStorage {
    // ===== Checkpoint =====

    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO checkpoint (id, last_query, phase, resuming, config_hash, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                last_query = excluded.last_query,
                phase = excluded.phase,
                resuming = excluded.resuming,
                config_hash = excluded.config_hash,
                updated_at = excluded.updated_at",
            params![
                checkpoint.last_attempted_query.as_ref().map(|q| q.as_str()),
                checkpoint.phase.to_db_string(),
                checkpoint.resuming,
                checkpoint.config_hash,
                checkpoint.updated_at,
            ],
        )?;
        Ok(())
    }

    fn load_checkpoint(&self) -> StorageResult<Option<Checkpoint>> {
        let row = self
            .conn
            .query_row(
                "SELECT last_query, phase, resuming, config_hash, updated_at
                 FROM checkpoint WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((last_query, phase, resuming, config_hash, updated_at)) = row else {
            return Ok(None);
        };

        let phase = HarvestPhase::from_db_string(&phase).ok_or_else(|| StorageError::Corrupt {
            table: "checkpoint",
            detail: format!("unknown phase '{}'", phase),
        })?;

        Ok(Some(Checkpoint {
            last_attempted_query: last_query.map(CandidateQuery::new),
            phase,
            resuming,
            config_hash,
            updated_at,
        }))
    }

    fn clear_checkpoint(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM checkpoint", [])?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM checkpoint", [])?;
        tx.execute("DELETE FROM entries", [])?;
        tx.execute("DELETE FROM failed_queries", [])?;
        tx.commit()?;
        Ok(())
    }

    // ===== Entries =====

    fn record_entries(&mut self, entries: &[Entry]) -> StorageResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO entries (code, alt_code, name, found_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                inserted += stmt.execute(params![
                    entry.code,
                    entry.alt_code.as_deref().unwrap_or(""),
                    entry.name,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn load_entries(&self) -> StorageResult<Vec<Entry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT code, alt_code, name FROM entries ORDER BY id")?;

        let entries = stmt
            .query_map([], |row| {
                let code: String = row.get(0)?;
                let alt_code: String = row.get(1)?;
                let name: String = row.get(2)?;
                Ok(Entry {
                    code,
                    alt_code: (!alt_code.is_empty()).then_some(alt_code),
                    name,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn count_entries(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Failed Queries =====

    fn record_failed(&mut self, query: &CandidateQuery) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO failed_queries (query, recorded_at) VALUES (?1, ?2)",
            params![query.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove_failed(&mut self, query: &CandidateQuery) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM failed_queries WHERE query = ?1",
            params![query.as_str()],
        )?;
        Ok(())
    }

    fn load_failed(&self) -> StorageResult<Vec<CandidateQuery>> {
        let mut stmt = self
            .conn
            .prepare("SELECT query FROM failed_queries ORDER BY query")?;

        let queries = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|r| r.map(CandidateQuery::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(queries)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], Self::run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self
            .conn
            .query_row(&sql, [], Self::run_from_row)
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let finished_at = (status != RunStatus::Running).then_some(now);
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished_at, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(
        &mut self,
        run_id: i64,
        entries_found: u64,
        failed_count: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, entries_found = ?3, failed_count = ?4
             WHERE id = ?5",
            params![
                RunStatus::Completed.to_db_string(),
                now,
                entries_found as i64,
                failed_count as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }
}
