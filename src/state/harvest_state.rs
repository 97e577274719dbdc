use crate::catalog::Entry;
use crate::harvest::CandidateQuery;
use std::collections::{BTreeSet, HashSet};

/// Mutable state of one harvest
///
/// Owned exclusively by the harvester for the duration of a run and passed
/// by `&mut` to the components that update it. `collected` only ever grows;
/// a query leaves `failed_queries` only when a later attempt resolves it.
#[derive(Debug, Default)]
pub struct HarvestState {
    /// The query most recently handed to the fetch client
    pub last_attempted_query: Option<CandidateQuery>,

    /// Whether the harvester is inside a cooldown
    pub cooldown_active: bool,

    collected: Vec<Entry>,
    seen: HashSet<Entry>,
    failed_queries: BTreeSet<CandidateQuery>,
}

impl HarvestState {
    /// Creates an empty state for a fresh run
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds state from persisted progress when resuming
    ///
    /// Duplicate entries in the input are absorbed.
    pub fn restore(
        entries: impl IntoIterator<Item = Entry>,
        failed: impl IntoIterator<Item = CandidateQuery>,
    ) -> Self {
        let mut state = Self::new();
        for entry in entries {
            state.insert_entry(entry);
        }
        state.failed_queries.extend(failed);
        state
    }

    /// Inserts an entry, returning false if an identical one was already collected
    pub fn insert_entry(&mut self, entry: Entry) -> bool {
        if self.seen.contains(&entry) {
            return false;
        }
        self.seen.insert(entry.clone());
        self.collected.push(entry);
        true
    }

    /// Collected entries in first-seen order
    pub fn collected(&self) -> &[Entry] {
        &self.collected
    }

    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }

    pub fn failed_queries(&self) -> &BTreeSet<CandidateQuery> {
        &self.failed_queries
    }

    /// Records a query whose retry budget ran out
    pub fn mark_failed(&mut self, query: CandidateQuery) -> bool {
        self.failed_queries.insert(query)
    }

    /// Removes a query from the failed set after it resolved
    pub fn mark_recovered(&mut self, query: &CandidateQuery) -> bool {
        self.failed_queries.remove(query)
    }

    pub fn is_failed(&self, query: &CandidateQuery) -> bool {
        self.failed_queries.contains(query)
    }

    /// Consumes the state, yielding entries and the remaining failed queries
    pub fn into_parts(self) -> (Vec<Entry>, BTreeSet<CandidateQuery>) {
        (self.collected, self.failed_queries)
    }
}
