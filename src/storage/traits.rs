//! Storage traits and error types
//!
//! This module defines the trait interface for progress storage backends and
//! associated error types.

use crate::catalog::Entry;
use crate::harvest::CandidateQuery;
use crate::storage::{Checkpoint, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for progress storage backends
///
/// This trait defines everything the harvester persists between runs: the
/// resume checkpoint, the entries collected so far, the queries that ran out
/// of retries, and a log of runs.
pub trait ProgressStore {
    // ===== Checkpoint =====

    /// Replaces the stored checkpoint
    ///
    /// Must be durable when this returns; the harvester relies on it before
    /// issuing the next query.
    fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Loads the stored checkpoint, if any
    fn load_checkpoint(&self) -> StorageResult<Option<Checkpoint>>;

    /// Removes the checkpoint, keeping entries and failed queries
    fn clear_checkpoint(&mut self) -> StorageResult<()>;

    /// Removes the checkpoint, all entries and all failed queries
    fn clear(&mut self) -> StorageResult<()>;

    // ===== Entries =====

    /// Stores entries, ignoring ones already present
    ///
    /// # Returns
    ///
    /// The number of rows actually inserted
    fn record_entries(&mut self, entries: &[Entry]) -> StorageResult<usize>;

    /// Loads every stored entry in insertion order
    fn load_entries(&self) -> StorageResult<Vec<Entry>>;

    /// Counts stored entries
    fn count_entries(&self) -> StorageResult<u64>;

    // ===== Failed Queries =====

    /// Records a query whose retry budget was exhausted
    fn record_failed(&mut self, query: &CandidateQuery) -> StorageResult<()>;

    /// Forgets a failed query after it succeeded later
    fn remove_failed(&mut self, query: &CandidateQuery) -> StorageResult<()>;

    /// Loads all failed queries, sorted lexicographically
    fn load_failed(&self) -> StorageResult<Vec<CandidateQuery>>;

    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp and final counts
    fn complete_run(
        &mut self,
        run_id: i64,
        entries_found: u64,
        failed_count: u64,
    ) -> StorageResult<()>;
}
