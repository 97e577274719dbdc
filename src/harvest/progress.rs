//! Progress reporting hooks

use crate::catalog::Entry;
use crate::harvest::enumerator::CandidateQuery;
use std::collections::BTreeSet;

/// Receives progress notifications from a running harvest
///
/// Both methods default to doing nothing. Implementations must return
/// quickly; they run inline with the harvest loop.
pub trait ProgressSink: Send + Sync {
    /// Called after each candidate resolves
    fn on_progress(&self, _query: &CandidateQuery, _collected: usize) {}

    /// Called once when the harvest completes
    fn on_complete(&self, _entries: &[Entry], _failed: &BTreeSet<CandidateQuery>) {}
}

/// Sink that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {}

/// Sink that reports through `tracing`
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    every: usize,
}

impl LogSink {
    /// Logs at info level for first-level queries and whenever the entry
    /// count is a multiple of `every`, and at debug otherwise
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new(25)
    }
}

impl ProgressSink for LogSink {
    fn on_progress(&self, query: &CandidateQuery, collected: usize) {
        // The first-level letter is the most useful progress marker
        let top_level = query.depth() == 1;
        if top_level || collected % self.every == 0 {
            tracing::info!("At {}: {} entries collected", query, collected);
        } else {
            tracing::debug!("At {}: {} entries collected", query, collected);
        }
    }

    fn on_complete(&self, entries: &[Entry], failed: &BTreeSet<CandidateQuery>) {
        tracing::info!(
            "Harvest complete: {} entries, {} failed queries",
            entries.len(),
            failed.len()
        );
        if !failed.is_empty() {
            let list: Vec<&str> = failed.iter().map(|q| q.as_str()).collect();
            tracing::warn!("Still failing: {}", list.join(", "));
        }
    }
}
