//! Deduplicating aggregator
//!
//! The aggregator canonicalizes raw records with the source's convention and
//! folds them into the harvest state. It holds no state of its own.

use crate::catalog::{Entry, RawRecord, RecordConvention};
use crate::harvest::CandidateQuery;
use crate::state::HarvestState;
use std::collections::BTreeSet;

/// Result of adding one response worth of records
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    /// Records that mapped to a complete entry, duplicates included
    pub accepted: usize,

    /// Entries not seen before this call
    pub added: Vec<Entry>,
}

impl AddOutcome {
    /// Returns true if the response contained at least one usable record
    pub fn has_results(&self) -> bool {
        self.accepted > 0
    }
}

/// Canonicalizes and collects entries into a unique set
#[derive(Debug, Clone)]
pub struct Aggregator {
    convention: RecordConvention,
}

impl Aggregator {
    pub fn new(convention: RecordConvention) -> Self {
        Self { convention }
    }

    /// Adds a response's records to the collected set
    ///
    /// Records that do not fit the convention are skipped; duplicates across
    /// queries are silently absorbed.
    pub fn add(&self, state: &mut HarvestState, records: &[RawRecord]) -> AddOutcome {
        let mut outcome = AddOutcome::default();

        for record in records {
            let Some(entry) = self.convention.to_entry(record) else {
                tracing::trace!("Skipping record that does not fit the convention: {:?}", record);
                continue;
            };
            outcome.accepted += 1;
            if state.insert_entry(entry.clone()) {
                outcome.added.push(entry);
            }
        }

        outcome
    }

    /// Records a query whose retry budget ran out
    pub fn failed(&self, state: &mut HarvestState, query: &CandidateQuery) {
        if state.mark_failed(query.clone()) {
            tracing::warn!("Query {} recorded as failed", query);
        }
    }

    /// Clears a previously failed query after it resolved
    pub fn recovered(&self, state: &mut HarvestState, query: &CandidateQuery) {
        if state.mark_recovered(query) {
            tracing::info!("Previously failed query {} resolved", query);
        }
    }

    /// Produces the final entries and the queries that are still failing
    pub fn finalize(&self, state: HarvestState) -> (Vec<Entry>, BTreeSet<CandidateQuery>) {
        state.into_parts()
    }
}
