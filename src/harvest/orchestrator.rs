//! Harvest orchestrator - main enumeration loop
//!
//! This module contains the drive loop that coordinates all aspects of a
//! harvest, including:
//! - Loading or discarding stored progress
//! - Walking the enumerator through the rate limiter and retry controller
//! - Handing session loss to the recovery manager
//! - Persisting the checkpoint, entries and failed queries
//! - One final retry pass over failed queries before finalizing

use crate::catalog::{Aggregator, Entry};
use crate::config::{Config, HarvesterConfig};
use crate::harvest::control::HarvestControl;
use crate::harvest::enumerator::{CandidateQuery, Enumerator};
use crate::harvest::fetcher::{build_http_client, HttpQueryClient, QueryClient};
use crate::harvest::progress::{LogSink, NullSink, ProgressSink};
use crate::harvest::rate_limiter::RateLimiter;
use crate::harvest::recovery::{RecoveryManager, RecoveryOutcome};
use crate::harvest::retry::{Attempted, RetryBudget, RetryController};
use crate::harvest::session::{HttpSessionProvider, SessionContext, SessionProvider};
use crate::state::HarvestState;
use crate::storage::{Checkpoint, HarvestPhase, ProgressStore, RunStatus, SqliteStorage};
use crate::{HarvestError, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Final result of a completed harvest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    /// Unique entries in first-seen order
    pub entries: Vec<Entry>,

    /// Queries still failing after the retry pass
    pub failed_queries: BTreeSet<CandidateQuery>,

    /// Candidates processed by this run, retry pass included
    pub queries_attempted: usize,

    /// Whether this run continued from a checkpoint
    pub resumed: bool,
}

/// How a call to [`Harvester::start`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestOutcome {
    Completed(HarvestReport),

    /// A stop was requested; `checkpoint` is where a resumed run continues
    Stopped { checkpoint: Option<CandidateQuery> },

    /// Another harvest sharing this control is active; nothing was done
    AlreadyRunning,
}

/// Per-run bookkeeping owned by the drive loop
struct Run {
    id: i64,
    state: HarvestState,
    session: SessionContext,
    recovery: RecoveryManager,
    attempted: usize,
}

enum Flow {
    Finished,
    Stopped(CandidateQuery),
}

enum Resolution {
    Done { has_results: bool },
    Stopped,
}

/// Main harvest engine
pub struct Harvester {
    config: HarvesterConfig,
    config_hash: String,
    client: Box<dyn QueryClient>,
    session: Box<dyn SessionProvider>,
    store: Box<dyn ProgressStore + Send>,
    sink: Box<dyn ProgressSink>,
    aggregator: Aggregator,
    rate_limiter: RateLimiter,
    retry: RetryController,
    control: Arc<HarvestControl>,
}

impl Harvester {
    /// Creates a harvester from its collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `config_hash` - Hash of the configuration file, stored with each checkpoint
    /// * `client` - Performs one search request per call
    /// * `session` - Invalidates and renews the remote session
    /// * `store` - Durable progress storage
    pub fn new(
        config: &Config,
        config_hash: &str,
        client: Box<dyn QueryClient>,
        session: Box<dyn SessionProvider>,
        store: Box<dyn ProgressStore + Send>,
    ) -> Self {
        let harvester = &config.harvester;
        Self {
            config: harvester.clone(),
            config_hash: config_hash.to_string(),
            client,
            session,
            store,
            sink: Box::new(NullSink),
            aggregator: Aggregator::new(config.endpoint.records.clone()),
            rate_limiter: RateLimiter::new(harvester.min_delay(), harvester.max_delay()),
            retry: RetryController::from_config(harvester),
            control: Arc::new(HarvestControl::new()),
        }
    }

    /// Creates a harvester talking HTTP to the configured endpoint and
    /// storing progress in the configured SQLite database
    pub fn from_config(config: &Config, config_hash: &str) -> Result<Self> {
        let http = build_http_client(&config.endpoint)?;
        let client = HttpQueryClient::new(http.clone(), config.endpoint.clone());
        let session = HttpSessionProvider::new(http, config.endpoint.session_url.clone());
        let store = SqliteStorage::new(Path::new(&config.output.database_path))?;

        Ok(Self::new(
            config,
            config_hash,
            Box::new(client),
            Box::new(session),
            Box::new(store),
        )
        .with_sink(Box::new(LogSink::default())))
    }

    /// Replaces the progress sink
    pub fn with_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shares run control with other harvesters or with the caller
    pub fn with_control(mut self, control: Arc<HarvestControl>) -> Self {
        self.control = control;
        self
    }

    /// Handle for observing the run and requesting a stop
    pub fn control(&self) -> Arc<HarvestControl> {
        Arc::clone(&self.control)
    }

    /// Requests a graceful stop of the active harvest
    pub fn stop(&self) {
        self.control.stop();
    }

    pub fn is_running(&self) -> bool {
        self.control.is_running()
    }

    /// Read access to stored progress
    pub fn store(&self) -> &dyn ProgressStore {
        &*self.store
    }

    /// Runs a harvest to completion or until stopped
    ///
    /// With `resume` set and a stored checkpoint, continues exactly at the
    /// checkpointed query with the stored entries and failed queries.
    /// Otherwise all stored progress is discarded first.
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestOutcome)` - The run completed, stopped, or was not started
    /// * `Err(HarvestError)` - A fatal error halted the run; the checkpoint is kept
    pub async fn start(&mut self, resume: bool) -> Result<HarvestOutcome> {
        let control = Arc::clone(&self.control);
        let Some(_guard) = control.begin() else {
            tracing::warn!("A harvest is already running; ignoring start request");
            return Ok(HarvestOutcome::AlreadyRunning);
        };

        let checkpoint = if resume {
            self.store.load_checkpoint()?
        } else {
            None
        };

        let state = match &checkpoint {
            Some(checkpoint) => {
                if checkpoint.config_hash != self.config_hash {
                    tracing::warn!("Configuration changed since the checkpoint was written");
                }
                let state =
                    HarvestState::restore(self.store.load_entries()?, self.store.load_failed()?);
                tracing::info!(
                    "Resuming at {} ({}) with {} entries and {} failed queries",
                    checkpoint
                        .last_attempted_query
                        .as_ref()
                        .map_or("<start>", |q| q.as_str()),
                    checkpoint.phase.to_db_string(),
                    state.collected_count(),
                    state.failed_queries().len()
                );
                state
            }
            None => {
                if resume {
                    tracing::info!("No checkpoint found, starting fresh");
                } else {
                    tracing::info!("Starting fresh harvest");
                }
                self.store.clear()?;
                HarvestState::new()
            }
        };

        let run_id = self.store.create_run(&self.config_hash)?;
        let mut run = Run {
            id: run_id,
            state,
            session: SessionContext::default(),
            recovery: RecoveryManager::new(
                self.config.cooldown(),
                self.config.resume_delay(),
                self.config.max_consecutive_recoveries,
            ),
            attempted: 0,
        };

        let flow = self.drive(&mut run, checkpoint.as_ref()).await;
        match flow {
            Ok(Flow::Finished) => self.finish(run, checkpoint.is_some()),
            Ok(Flow::Stopped(query)) => {
                self.store.update_run_status(run.id, RunStatus::Interrupted)?;
                tracing::info!(
                    "Harvest stopped at {} with {} entries collected",
                    query,
                    run.state.collected_count()
                );
                Ok(HarvestOutcome::Stopped {
                    checkpoint: Some(query),
                })
            }
            Err(e) => {
                tracing::error!("Harvest halted: {}", e);
                if let Err(status_err) = self.store.update_run_status(run.id, RunStatus::Failed) {
                    tracing::warn!("Failed to record run status: {}", status_err);
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, run: &mut Run, checkpoint: Option<&Checkpoint>) -> Result<Flow> {
        run.session = self
            .session
            .refresh()
            .await
            .map_err(|e| HarvestError::SessionRefresh(e.to_string()))?;

        let resume_query = checkpoint.and_then(|c| c.last_attempted_query.as_ref());
        let phase = checkpoint.map(|c| c.phase).unwrap_or_default();

        if phase == HarvestPhase::Enumerating {
            if let Flow::Stopped(query) = self.enumerate(run, resume_query).await? {
                return Ok(Flow::Stopped(query));
            }
            self.retry_failed(run, None).await
        } else {
            self.retry_failed(run, resume_query).await
        }
    }

    fn enumerator(&self, resume_at: Option<&CandidateQuery>) -> Enumerator {
        let alphabet = self.config.alphabet_chars();
        let Some(query) = resume_at else {
            return Enumerator::new(alphabet, self.config.max_depth);
        };
        match Enumerator::resume_at(alphabet.clone(), self.config.max_depth, query) {
            Ok(enumerator) => enumerator,
            Err(e) => {
                tracing::warn!("Cannot resume at checkpoint ({}); starting from the beginning", e);
                Enumerator::new(alphabet, self.config.max_depth)
            }
        }
    }

    async fn enumerate(&mut self, run: &mut Run, resume_at: Option<&CandidateQuery>) -> Result<Flow> {
        let mut enumerator = self.enumerator(resume_at);
        let mut expand = false;

        while let Some(query) = enumerator.next(expand) {
            let budget = self.retry.budget();
            expand = match self.resolve(run, &query, HarvestPhase::Enumerating, budget).await {
                Ok(Resolution::Done { has_results }) => has_results,
                Ok(Resolution::Stopped) => return Ok(Flow::Stopped(query)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    self.record_failure(run, &query, &e);
                    false
                }
            };
            self.sink.on_progress(&query, run.state.collected_count());
        }

        Ok(Flow::Finished)
    }

    /// Re-attempts every failed query once, in enumeration order
    ///
    /// Results are collected but never expanded into children.
    async fn retry_failed(
        &mut self,
        run: &mut Run,
        resume_at: Option<&CandidateQuery>,
    ) -> Result<Flow> {
        let order = Enumerator::new(self.config.alphabet_chars(), self.config.max_depth);
        let mut pending: Vec<CandidateQuery> =
            run.state.failed_queries().iter().cloned().collect();
        pending.sort_by_key(|q| order.order_key(q));
        if let Some(start) = resume_at {
            pending.retain(|q| !order.precedes(q, start));
        }

        if pending.is_empty() {
            return Ok(Flow::Finished);
        }
        tracing::info!("Retrying {} failed queries", pending.len());

        for query in pending {
            let budget = self.retry.final_pass_budget();
            match self.resolve(run, &query, HarvestPhase::RetryPass, budget).await {
                Ok(Resolution::Done { .. }) => {}
                Ok(Resolution::Stopped) => return Ok(Flow::Stopped(query)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => self.record_failure(run, &query, &e),
            }
            self.sink.on_progress(&query, run.state.collected_count());
        }

        Ok(Flow::Finished)
    }

    /// Drives one candidate until it resolves or the run must stop
    async fn resolve(
        &mut self,
        run: &mut Run,
        query: &CandidateQuery,
        phase: HarvestPhase,
        mut budget: RetryBudget,
    ) -> Result<Resolution> {
        run.state.last_attempted_query = Some(query.clone());
        run.attempted += 1;

        loop {
            self.store
                .save_checkpoint(&Checkpoint::new(Some(query.clone()), phase, &self.config_hash))?;

            if !self.rate_limiter.pace(&self.control).await {
                return Ok(Resolution::Stopped);
            }

            let attempted = self
                .retry
                .attempt(
                    &*self.client,
                    query,
                    &run.session,
                    &mut budget,
                    &self.control,
                )
                .await;

            match attempted {
                Attempted::Resolved(records) => {
                    run.recovery.settle()?;
                    let outcome = self.aggregator.add(&mut run.state, &records);
                    self.store.record_entries(&outcome.added)?;
                    if run.state.is_failed(query) {
                        self.aggregator.recovered(&mut run.state, query);
                        self.store.remove_failed(query)?;
                    }
                    tracing::debug!(
                        "Query {} returned {} records ({} new)",
                        query,
                        records.len(),
                        outcome.added.len()
                    );
                    return Ok(Resolution::Done {
                        has_results: outcome.has_results(),
                    });
                }
                Attempted::Empty => {
                    run.recovery.settle()?;
                    tracing::debug!("Query {} returned nothing", query);
                    return Ok(Resolution::Done { has_results: false });
                }
                Attempted::Exhausted { .. } => {
                    run.recovery.settle()?;
                    self.aggregator.failed(&mut run.state, query);
                    self.store.record_failed(query)?;
                    return Ok(Resolution::Done { has_results: false });
                }
                Attempted::SessionLost { cause } => {
                    let checkpoint = Checkpoint::new(Some(query.clone()), phase, &self.config_hash);
                    let outcome = run
                        .recovery
                        .recover(
                            query,
                            &cause,
                            checkpoint,
                            &mut run.state,
                            &mut *self.store,
                            &*self.session,
                            &self.control,
                        )
                        .await?;
                    match outcome {
                        RecoveryOutcome::Refreshed(context) => run.session = context,
                        RecoveryOutcome::Stopped => return Ok(Resolution::Stopped),
                    }
                }
                Attempted::Stopped => return Ok(Resolution::Stopped),
            }
        }
    }

    /// Records a candidate that raised a non-fatal error
    fn record_failure(&mut self, run: &mut Run, query: &CandidateQuery, error: &HarvestError) {
        tracing::error!("Error processing {}: {}", query, error);
        self.aggregator.failed(&mut run.state, query);
        if let Err(e) = self.store.record_failed(query) {
            tracing::warn!("Failed to persist failed query {}: {}", query, e);
        }
    }

    fn finish(&mut self, run: Run, resumed: bool) -> Result<HarvestOutcome> {
        let (entries, failed_queries) = self.aggregator.finalize(run.state);

        self.store.clear_checkpoint()?;
        self.store
            .complete_run(run.id, entries.len() as u64, failed_queries.len() as u64)?;
        self.sink.on_complete(&entries, &failed_queries);

        Ok(HarvestOutcome::Completed(HarvestReport {
            entries,
            failed_queries,
            queries_attempted: run.attempted,
            resumed,
        }))
    }
}

/// Runs a harvest with the HTTP client and SQLite storage
///
/// Ctrl-C stops the harvest gracefully; the checkpoint is kept for a later
/// resume.
///
/// # Example
///
/// ```no_run
/// use issuer_harvest::config::load_config_with_hash;
/// use issuer_harvest::harvest::run_harvest;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let outcome = run_harvest(&config, &hash, true).await?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(config: &Config, config_hash: &str, resume: bool) -> Result<HarvestOutcome> {
    let mut harvester = Harvester::from_config(config, config_hash)?;

    let control = harvester.control();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current query");
            control.stop();
        }
    });

    let outcome = harvester.start(resume).await;
    watcher.abort();
    outcome
}
