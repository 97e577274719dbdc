//! Adaptive depth-first prefix enumerator
//!
//! Candidates are produced over a fixed alphabet. Every single-character
//! prefix is visited in alphabet order; a prefix is expanded to its children
//! only when its own query returned results. Prefixes that return nothing are
//! pruned, so entities reachable only through a child of an empty prefix are
//! not enumerated.
//!
//! The traversal keeps an explicit stack of alphabet indices, which also makes
//! resuming at an arbitrary checkpointed query a matter of rebuilding the stack.

use crate::HarvestError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A query string over the enumeration alphabet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateQuery(String);

impl CandidateQuery {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of characters in the query
    pub fn depth(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for CandidateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CandidateQuery {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Produces candidate queries in adaptive depth-first order
#[derive(Debug, Clone)]
pub struct Enumerator {
    alphabet: Vec<char>,
    max_depth: usize,
    /// Alphabet indices of the current candidate, outermost first
    stack: Vec<usize>,
    /// Whether `stack` has already been handed out
    emitted: bool,
}

impl Enumerator {
    /// Creates an enumerator positioned before the first candidate
    pub fn new(alphabet: Vec<char>, max_depth: usize) -> Self {
        let stack = if alphabet.is_empty() { Vec::new() } else { vec![0] };
        Self {
            alphabet,
            max_depth: max_depth.max(1),
            stack,
            emitted: false,
        }
    }

    /// Creates an enumerator whose next candidate is `query`
    ///
    /// Nothing before `query` in enumeration order will be produced, and
    /// `query` itself is produced first.
    pub fn resume_at(
        alphabet: Vec<char>,
        max_depth: usize,
        query: &CandidateQuery,
    ) -> Result<Self, HarvestError> {
        if query.depth() == 0 || query.depth() > max_depth.max(1) {
            return Err(HarvestError::InvalidQuery(format!(
                "'{}' is not a prefix of length 1..={}",
                query, max_depth
            )));
        }

        let stack = query
            .as_str()
            .chars()
            .map(|c| {
                alphabet.iter().position(|&a| a == c).ok_or_else(|| {
                    HarvestError::InvalidQuery(format!(
                        "'{}' contains '{}', which is not in the alphabet",
                        query, c
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            alphabet,
            max_depth: max_depth.max(1),
            stack,
            emitted: false,
        })
    }

    /// Returns the next candidate
    ///
    /// `expand_previous` reports whether the previously returned candidate
    /// produced at least one result; only then are its children visited.
    /// It is ignored on the first call and for candidates at maximum depth.
    pub fn next(&mut self, expand_previous: bool) -> Option<CandidateQuery> {
        if self.stack.is_empty() {
            return None;
        }

        if self.emitted {
            if expand_previous && self.stack.len() < self.max_depth {
                self.stack.push(0);
            } else {
                self.advance();
            }
        }

        if self.stack.is_empty() {
            return None;
        }

        self.emitted = true;
        Some(self.current())
    }

    /// Moves to the next sibling, climbing out of exhausted levels
    fn advance(&mut self) {
        while let Some(top) = self.stack.last_mut() {
            *top += 1;
            if *top < self.alphabet.len() {
                return;
            }
            self.stack.pop();
        }
    }

    fn current(&self) -> CandidateQuery {
        CandidateQuery(self.stack.iter().map(|&i| self.alphabet[i]).collect())
    }

    /// All first-level candidates in order
    pub fn first_level(&self) -> Vec<CandidateQuery> {
        self.alphabet
            .iter()
            .map(|c| CandidateQuery(c.to_string()))
            .collect()
    }

    /// Sort key placing queries in enumeration order
    ///
    /// Characters outside the alphabet sort last.
    pub fn order_key(&self, query: &CandidateQuery) -> Vec<usize> {
        query
            .as_str()
            .chars()
            .map(|c| {
                self.alphabet
                    .iter()
                    .position(|&x| x == c)
                    .unwrap_or(usize::MAX)
            })
            .collect()
    }

    /// Returns true if `a` is enumerated strictly before `b`
    pub fn precedes(&self, a: &CandidateQuery, b: &CandidateQuery) -> bool {
        self.order_key(a) < self.order_key(b)
    }
}
