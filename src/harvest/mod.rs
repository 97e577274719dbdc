//! Harvest engine
//!
//! This module contains the enumeration engine and its collaborators:
//! - Adaptive depth-first prefix enumeration
//! - Randomized request pacing
//! - One-shot search requests with outcome classification
//! - Bounded per-query retries
//! - Session-loss cooldown and recovery
//! - The orchestrator that drives them and persists progress

mod control;
mod enumerator;
mod fetcher;
mod orchestrator;
mod progress;
mod rate_limiter;
mod recovery;
mod retry;
mod session;

pub use control::HarvestControl;
pub use enumerator::{CandidateQuery, Enumerator};
pub use fetcher::{
    build_http_client, h2_reason, is_session_loss, matches_session_loss, parse_records,
    HttpQueryClient, QueryClient, QueryResult,
};
pub use orchestrator::{run_harvest, HarvestOutcome, HarvestReport, Harvester};
pub use progress::{LogSink, NullSink, ProgressSink};
pub use rate_limiter::RateLimiter;
pub use recovery::{RecoveryManager, RecoveryOutcome};
pub use retry::{Attempted, RetryBudget, RetryController};
pub use session::{HttpSessionProvider, SessionContext, SessionError, SessionProvider};
