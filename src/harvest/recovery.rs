//! Session-loss recovery
//!
//! Drives the `Normal → CoolingDown → Recovering → Normal` cycle. The
//! checkpoint naming the failing query is persisted before the session is
//! touched, so a crash mid-cooldown still resumes at that query.

use crate::harvest::control::HarvestControl;
use crate::harvest::enumerator::CandidateQuery;
use crate::harvest::session::{SessionContext, SessionProvider};
use crate::state::{HarvestState, RecoveryPhase};
use crate::storage::{Checkpoint, ProgressStore};
use crate::HarvestError;
use std::time::Duration;

/// Result of one recovery cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// A fresh session is ready; re-issue the failing query with it
    Refreshed(SessionContext),

    /// A stop was requested during the cooldown or grace delay
    Stopped,
}

/// Owns the recovery phase and the pacing around a session refresh
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    phase: RecoveryPhase,
    cooldown: Duration,
    grace: Duration,
    max_consecutive: Option<u32>,
    consecutive: u32,
}

impl RecoveryManager {
    /// Creates a manager
    ///
    /// # Arguments
    ///
    /// * `cooldown` - How long to stay quiet after a session loss
    /// * `grace` - Delay between a refresh and the next query
    /// * `max_consecutive` - Recoveries allowed without a successful query in between
    pub fn new(cooldown: Duration, grace: Duration, max_consecutive: Option<u32>) -> Self {
        Self {
            phase: RecoveryPhase::Normal,
            cooldown,
            grace,
            max_consecutive,
            consecutive: 0,
        }
    }

    pub fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    /// Recoveries since the last query that resolved normally
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    fn transition(&mut self, to: RecoveryPhase) -> Result<(), HarvestError> {
        if !self.phase.can_transition_to(to) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::debug!("Recovery phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    /// Runs one recovery cycle for `query`
    ///
    /// `checkpoint` must already point at `query`; it is persisted (flagged as
    /// resuming) before the session is invalidated. A failure to persist it
    /// is fatal.
    #[allow(clippy::too_many_arguments)]
    pub async fn recover(
        &mut self,
        query: &CandidateQuery,
        cause: &str,
        checkpoint: Checkpoint,
        state: &mut HarvestState,
        store: &mut dyn ProgressStore,
        session: &dyn SessionProvider,
        control: &HarvestControl,
    ) -> Result<RecoveryOutcome, HarvestError> {
        self.consecutive += 1;
        if let Some(max) = self.max_consecutive {
            if self.consecutive > max {
                return Err(HarvestError::RecoveryLimit {
                    query: query.to_string(),
                    recoveries: max,
                });
            }
        }

        self.transition(RecoveryPhase::CoolingDown)?;
        state.cooldown_active = true;
        state.last_attempted_query = Some(query.clone());

        store
            .save_checkpoint(&checkpoint.resuming())
            .map_err(|e| HarvestError::Checkpoint(e.to_string()))?;

        session.invalidate().await;

        tracing::warn!(
            "Session lost on query {} ({}); cooling down for {}s",
            query,
            cause,
            self.cooldown.as_secs()
        );
        if !control.pause(self.cooldown).await {
            tracing::info!("Stop requested during cooldown");
            return Ok(RecoveryOutcome::Stopped);
        }

        self.transition(RecoveryPhase::Recovering)?;
        state.cooldown_active = false;

        let context = session
            .refresh()
            .await
            .map_err(|e| HarvestError::SessionRefresh(e.to_string()))?;
        tracing::info!(
            "Session refreshed (generation {}); resuming at {}",
            context.generation,
            query
        );

        if !control.pause(self.grace).await {
            return Ok(RecoveryOutcome::Stopped);
        }

        Ok(RecoveryOutcome::Refreshed(context))
    }

    /// Marks the end of a recovery once a query has resolved normally
    ///
    /// A no-op when no recovery is in progress.
    pub fn settle(&mut self) -> Result<(), HarvestError> {
        if self.phase == RecoveryPhase::Recovering {
            self.transition(RecoveryPhase::Normal)?;
        }
        self.consecutive = 0;
        Ok(())
    }
}
