//! Issuer-Harvest: a resumable prefix-enumeration harvester
//!
//! This crate enumerates short query prefixes against a rate-limited,
//! session-bounded search endpoint, deduplicates the records it returns,
//! survives session loss through cooldown and recovery, and persists enough
//! progress to resume after a full process restart.

pub mod catalog;
pub mod config;
pub mod harvest;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Issuer-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session could not be refreshed: {0}")]
    SessionRefresh(String),

    #[error("Checkpoint could not be persisted: {0}")]
    Checkpoint(String),

    #[error("Gave up on query {query} after {recoveries} consecutive session recoveries")]
    RecoveryLimit { query: String, recoveries: u32 },

    #[error("Invalid recovery transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::RecoveryPhase,
        to: state::RecoveryPhase,
    },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Output error: {0}")]
    Output(String),
}

impl HarvestError {
    /// Returns true if this error must halt the whole harvest
    ///
    /// Everything else raised while processing a single candidate is logged
    /// and the candidate is recorded as failed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::SessionRefresh(_)
                | Self::Checkpoint(_)
                | Self::RecoveryLimit { .. }
                | Self::InvalidTransition { .. }
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Issuer-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use catalog::{Aggregator, Entry, RecordConvention};
pub use config::Config;
pub use harvest::{CandidateQuery, HarvestOutcome, HarvestReport, Harvester};
pub use state::{HarvestState, RecoveryPhase};
