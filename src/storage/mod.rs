//! Storage module for persisting harvest progress
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - The single-row resume checkpoint
//! - Accumulated entries and failed queries
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ProgressStore, StorageError, StorageResult};

use crate::harvest::CandidateQuery;
use crate::HarvestError;

use chrono::Utc;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, HarvestError> {
    SqliteStorage::new(path)
}

/// Which part of the harvest a checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HarvestPhase {
    /// Walking the prefix space
    #[default]
    Enumerating,

    /// Re-attempting queries whose budget ran out
    RetryPass,
}

impl HarvestPhase {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Enumerating => "enumerating",
            Self::RetryPass => "retry-pass",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "enumerating" => Some(Self::Enumerating),
            "retry-pass" => Some(Self::RetryPass),
            _ => None,
        }
    }
}

/// Persisted resume point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// The query that was about to be (or was being) attempted
    pub last_attempted_query: Option<CandidateQuery>,
    pub phase: HarvestPhase,

    /// True when the checkpoint was written while recovering a session
    pub resuming: bool,
    pub config_hash: String,
    pub updated_at: String,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time
    pub fn new(
        last_attempted_query: Option<CandidateQuery>,
        phase: HarvestPhase,
        config_hash: &str,
    ) -> Self {
        Self {
            last_attempted_query,
            phase,
            resuming: false,
            config_hash: config_hash.to_string(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }

    /// Marks the checkpoint as written during session recovery
    pub fn resuming(mut self) -> Self {
        self.resuming = true;
        self
    }
}

/// Represents a harvest run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub entries_found: Option<u64>,
    pub failed_count: Option<u64>,
}

/// Status of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
