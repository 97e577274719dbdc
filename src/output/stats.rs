//! Statistics from the progress database
//!
//! This module provides functionality for extracting and displaying
//! harvest progress from the storage layer.

use crate::harvest::CandidateQuery;
use crate::storage::{Checkpoint, ProgressStore, RunRecord};
use crate::HarvestError;

/// Harvest progress summary
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    /// Resume point, if a harvest is unfinished
    pub checkpoint: Option<Checkpoint>,

    /// Number of unique entries stored
    pub entries: u64,

    /// Queries currently recorded as failed
    pub failed_queries: Vec<CandidateQuery>,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn ProgressStore) -> Result<HarvestStatistics, HarvestError> {
    Ok(HarvestStatistics {
        checkpoint: storage.load_checkpoint()?,
        entries: storage.count_entries()?,
        failed_queries: storage.load_failed()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Progress:");
    println!("  Entries stored: {}", stats.entries);
    println!("  Failed queries: {}", stats.failed_queries.len());
    match &stats.checkpoint {
        Some(checkpoint) => {
            let query = checkpoint
                .last_attempted_query
                .as_ref()
                .map_or("<start>", |q| q.as_str());
            println!(
                "  Checkpoint: {} ({}{}), saved {}",
                query,
                checkpoint.phase.to_db_string(),
                if checkpoint.resuming { ", mid-recovery" } else { "" },
                checkpoint.updated_at
            );
        }
        None => println!("  Checkpoint: none"),
    }
    println!();

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        if let (Some(found), Some(failed)) = (run.entries_found, run.failed_count) {
            println!("  Result: {} entries, {} failed", found, failed);
        }
        println!();
    }

    if !stats.failed_queries.is_empty() {
        let list: Vec<&str> = stats.failed_queries.iter().map(|q| q.as_str()).collect();
        println!("Failed Queries ({}):", list.len());
        println!("  {}", list.join(", "));
        println!();
    }
}
