//! Per-query retry with backoff
//!
//! A query gets a fixed number of attempts. Only transient failures consume
//! that budget; a session loss hands control back to the harvester with the
//! budget untouched so the same query can be re-issued after recovery.

use crate::catalog::RawRecord;
use crate::config::HarvesterConfig;
use crate::harvest::control::HarvestControl;
use crate::harvest::enumerator::CandidateQuery;
use crate::harvest::fetcher::{QueryClient, QueryResult};
use crate::harvest::rate_limiter::RateLimiter;
use crate::harvest::session::SessionContext;
use std::time::Duration;

/// Highest doubling applied to the backoff window
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Attempts remaining for one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    total: u32,
    consumed: u32,
}

impl RetryBudget {
    pub fn new(total: u32) -> Self {
        Self { total, consumed: 0 }
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.consumed)
    }

    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn consume(&mut self) {
        self.consumed = self.consumed.saturating_add(1);
    }
}

/// How a query's attempts ended
#[derive(Debug, Clone, PartialEq)]
pub enum Attempted {
    /// The endpoint answered with a well-formed list
    Resolved(Vec<RawRecord>),

    /// The endpoint answered with nothing
    Empty,

    /// Every attempt failed transiently
    Exhausted { cause: String },

    /// The session was terminated; the budget is left as it was
    SessionLost { cause: String },

    /// A stop was requested during backoff
    Stopped,
}

/// Retry settings shared by every query
#[derive(Debug, Clone)]
pub struct RetryController {
    max_attempts: u32,
    final_pass_attempts: u32,
    backoff: RateLimiter,
    exponential: bool,
}

impl RetryController {
    pub fn new(
        max_attempts: u32,
        final_pass_attempts: u32,
        backoff: RateLimiter,
        exponential: bool,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            final_pass_attempts: final_pass_attempts.max(1),
            backoff,
            exponential,
        }
    }

    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self::new(
            config.max_retries,
            config.final_pass_attempts,
            RateLimiter::new(config.min_delay(), config.max_delay()),
            config.exponential_backoff,
        )
    }

    /// Fresh budget for a query during enumeration
    pub fn budget(&self) -> RetryBudget {
        RetryBudget::new(self.max_attempts)
    }

    /// Fresh budget for a query during the final retry pass
    pub fn final_pass_budget(&self) -> RetryBudget {
        RetryBudget::new(self.final_pass_attempts)
    }

    /// Delay before the next attempt, given how many have been consumed
    pub fn backoff(&self, consumed: u32) -> Duration {
        let base = self.backoff.draw();
        if !self.exponential || consumed <= 1 {
            return base;
        }
        let exponent = (consumed - 1).min(MAX_BACKOFF_EXPONENT);
        base.saturating_mul(1 << exponent)
    }

    /// Issues `query` until it resolves, the budget runs out, the session is
    /// lost, or a stop is requested
    pub async fn attempt(
        &self,
        client: &dyn QueryClient,
        query: &CandidateQuery,
        session: &SessionContext,
        budget: &mut RetryBudget,
        control: &HarvestControl,
    ) -> Attempted {
        loop {
            match client.fetch(query, session).await {
                QueryResult::Success(records) => return Attempted::Resolved(records),
                QueryResult::EmptyQueryFailure => return Attempted::Empty,
                QueryResult::CatastrophicFailure(cause) => {
                    return Attempted::SessionLost { cause };
                }
                QueryResult::TransientFailure(cause) => {
                    budget.consume();
                    if budget.is_exhausted() {
                        tracing::warn!(
                            "Query {} failed after {} attempt(s): {}",
                            query,
                            budget.consumed(),
                            cause
                        );
                        return Attempted::Exhausted { cause };
                    }

                    let delay = self.backoff(budget.consumed());
                    tracing::debug!(
                        "Attempt {}/{} for {} failed ({}); retrying in {}ms",
                        budget.consumed(),
                        budget.total(),
                        query,
                        cause,
                        delay.as_millis()
                    );
                    if !control.pause(delay).await {
                        return Attempted::Stopped;
                    }
                }
            }
        }
    }
}
