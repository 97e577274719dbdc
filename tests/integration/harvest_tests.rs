//! Integration tests for the harvest engine
//!
//! These tests drive a full harvest against an in-process fake endpoint whose
//! per-query outcomes are scripted, with tokio's clock paused so cooldowns and
//! delays elapse instantly.

use async_trait::async_trait;
use issuer_harvest::catalog::RawRecord;
use issuer_harvest::config::{parse_config, Config};
use issuer_harvest::harvest::{
    CandidateQuery, HarvestControl, HarvestOutcome, HarvestReport, Harvester, ProgressSink,
    QueryClient, QueryResult, SessionContext, SessionError, SessionProvider,
};
use issuer_harvest::output::CatalogDocument;
use issuer_harvest::storage::{Checkpoint, HarvestPhase, ProgressStore, RunStatus, SqliteStorage};
use issuer_harvest::{Entry, HarvestError};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Shared, ordered event log
#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Queries sent to the endpoint, in order
    fn fetches(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("fetch:").map(str::to_string))
            .collect()
    }
}

/// Endpoint answering from per-query scripts, then from steady answers,
/// then with an empty list
struct FakeEndpoint {
    scripted: Mutex<HashMap<String, VecDeque<QueryResult>>>,
    steady: HashMap<String, QueryResult>,
    log: Log,
    generations: Log,
}

impl FakeEndpoint {
    fn new(log: &Log) -> Self {
        Self {
            scripted: Mutex::new(HashMap::new()),
            steady: HashMap::new(),
            log: log.clone(),
            generations: Log::default(),
        }
    }

    fn always(mut self, query: &str, result: QueryResult) -> Self {
        self.steady.insert(query.to_string(), result);
        self
    }

    fn then(self, query: &str, results: Vec<QueryResult>) -> Self {
        self.scripted
            .lock()
            .unwrap()
            .insert(query.to_string(), results.into());
        self
    }

    fn recording_generations(mut self, log: &Log) -> Self {
        self.generations = log.clone();
        self
    }
}

#[async_trait]
impl QueryClient for FakeEndpoint {
    async fn fetch(&self, query: &CandidateQuery, session: &SessionContext) -> QueryResult {
        self.log.push(format!("fetch:{}", query));
        self.generations
            .push(format!("{}@{}", query, session.generation));

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(query.as_str())
            .and_then(|queue| queue.pop_front());

        scripted
            .or_else(|| self.steady.get(query.as_str()).cloned())
            .unwrap_or(QueryResult::Success(vec![]))
    }
}

/// Session provider that logs calls and snapshots the stored checkpoint when
/// invalidated
struct FakeSession {
    log: Log,
    db: PathBuf,
    generation: AtomicU64,
    fail_after: Option<u64>,
}

impl FakeSession {
    fn new(log: &Log, db: &Path) -> Self {
        Self {
            log: log.clone(),
            db: db.to_path_buf(),
            generation: AtomicU64::new(0),
            fail_after: None,
        }
    }

    fn failing_after(mut self, refreshes: u64) -> Self {
        self.fail_after = Some(refreshes);
        self
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    async fn invalidate(&self) {
        let storage = SqliteStorage::new(&self.db).unwrap();
        let event = match storage.load_checkpoint().unwrap() {
            Some(Checkpoint {
                last_attempted_query: Some(query),
                resuming,
                phase,
                ..
            }) => format!(
                "invalidate@{}{}{}",
                query,
                if resuming { " resuming" } else { "" },
                if phase == HarvestPhase::RetryPass { " (retry-pass)" } else { "" }
            ),
            _ => "invalidate".to_string(),
        };
        self.log.push(event);
    }

    async fn refresh(&self) -> Result<SessionContext, SessionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_after.is_some_and(|n| generation > n) {
            self.log.push("refresh failed");
            return Err(SessionError::Rejected { status: 503 });
        }
        self.log.push("refresh");
        Ok(SessionContext {
            generation,
            cookie: Some(format!("session={}", generation)),
        })
    }
}

/// Requests a stop once a given query has resolved
struct StopAfter {
    control: Arc<HarvestControl>,
    query: &'static str,
}

impl ProgressSink for StopAfter {
    fn on_progress(&self, query: &CandidateQuery, _collected: usize) {
        if query.as_str() == self.query {
            self.control.stop();
        }
    }
}

fn config(alphabet: &str, db: &Path, extra: &str) -> Config {
    parse_config(&format!(
        r#"
[harvester]
alphabet = "{alphabet}"
min-delay-ms = 1000
max-delay-ms = 1000
{extra}

[endpoint]
source = "TEST"
url = "https://example.com/search"

[endpoint.records]
kind = "plain"

[output]
database-path = "{db}"
catalog-path = "catalog.json"
failed-path = "failed.json"
"#,
        db = db.display()
    ))
    .unwrap()
}

fn harvester(config: &Config, db: &Path, endpoint: FakeEndpoint, session: FakeSession) -> Harvester {
    Harvester::new(
        config,
        "hash",
        Box::new(endpoint),
        Box::new(session),
        Box::new(SqliteStorage::new(db).unwrap()),
    )
}

fn record(code: &str, name: &str) -> RawRecord {
    RawRecord::fields([("code", code), ("name", name)])
}

fn records(items: &[(&str, &str)]) -> QueryResult {
    QueryResult::Success(items.iter().map(|(c, n)| record(c, n)).collect())
}

fn transient() -> QueryResult {
    QueryResult::TransientFailure("HTTP 502".to_string())
}

fn session_abort() -> QueryResult {
    QueryResult::CatastrophicFailure(
        "stream error received: unspecific protocol error detected".to_string(),
    )
}

fn completed(outcome: HarvestOutcome) -> HarvestReport {
    match outcome {
        HarvestOutcome::Completed(report) => report,
        other => panic!("expected a completed harvest, got {:?}", other),
    }
}

fn queries(items: &[&str]) -> BTreeSet<CandidateQuery> {
    items.iter().map(|q| CandidateQuery::from(*q)).collect()
}

#[tokio::test(start_paused = true)]
async fn test_single_result_prefix_is_the_only_one_expanded() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("ABCD", &db, "");
    let endpoint = FakeEndpoint::new(&log).always("B", records(&[("BHP", "BHP Group")]));

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    assert_eq!(
        log.fetches(),
        vec!["A", "B", "BA", "BB", "BC", "BD", "C", "D"]
    );
    assert_eq!(report.entries, vec![Entry::new("BHP", None, "BHP Group")]);
    assert!(report.failed_queries.is_empty());

    let document = serde_json::to_value(CatalogDocument::new("TEST", &report.entries)).unwrap();
    assert_eq!(
        document["companies"],
        serde_json::json!([{"code": "BHP", "altCode": null, "name": "BHP Group"}])
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_prefix_is_never_expanded() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("AB", &db, "");
    let endpoint = FakeEndpoint::new(&log)
        .always("A", QueryResult::EmptyQueryFailure)
        .always("AB", records(&[("ABC", "ABC Learning")]));

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    assert!(!log.fetches().contains(&"AB".to_string()));
    assert_eq!(log.fetches(), vec!["A", "B"]);
    assert!(report.entries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_duplicates_across_queries_are_absorbed() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("AB", &db, "");
    let endpoint = FakeEndpoint::new(&log)
        .always(
            "B",
            records(&[("BHP", "BHP Group"), ("BHP", "BHP Group"), ("BXB", "Brambles")]),
        )
        .always("BA", records(&[("BHP", "BHP Group")]))
        .always("BB", records(&[("BXB", "Brambles"), ("BHP", " BHP Group ")]));

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    assert_eq!(
        report.entries,
        vec![
            Entry::new("BHP", None, "BHP Group"),
            Entry::new("BXB", None, "Brambles"),
        ]
    );
    let unique: BTreeSet<_> = report
        .entries
        .iter()
        .map(|e| (e.code.clone(), e.alt_code.clone(), e.name.clone()))
        .collect();
    assert_eq!(unique.len(), report.entries.len());
    assert_eq!(harvester.store().count_entries().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_session_abort_cools_down_and_reissues_query() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let generations = Log::default();
    let config = config("ABCD", &db, "");
    let endpoint = FakeEndpoint::new(&log)
        .then("C", vec![session_abort()])
        .recording_generations(&generations);

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let started = tokio::time::Instant::now();
    let report = completed(harvester.start(false).await.unwrap());

    assert_eq!(
        log.events(),
        vec![
            "refresh",
            "fetch:A",
            "fetch:B",
            "fetch:C",
            "invalidate@C resuming",
            "refresh",
            "fetch:C",
            "fetch:D",
        ]
    );
    assert_eq!(
        generations.events(),
        vec!["A@1", "B@1", "C@1", "C@2", "D@2"]
    );
    // 120s cooldown plus the 5s grace delay
    assert!(started.elapsed() >= Duration::from_secs(125));
    assert!(report.failed_queries.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_abort_does_not_consume_retries() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("C", &db, "max-retries = 2");
    let endpoint = FakeEndpoint::new(&log).then(
        "C",
        vec![transient(), session_abort(), records(&[("CBA", "Commonwealth Bank")])],
    );

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    assert!(report.failed_queries.is_empty());
    assert_eq!(report.entries.len(), 1);
    assert_eq!(log.fetches()[..3], ["C", "C", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_query_gets_exactly_one_more_attempt() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("PQR", &db, "");
    let endpoint = FakeEndpoint::new(&log).always("Q", transient());

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    let fetches = log.fetches();
    assert_eq!(fetches.iter().filter(|q| *q == "Q").count(), 6);
    assert!(!fetches.iter().any(|q| q.starts_with('Q') && q.len() > 1));
    assert_eq!(
        fetches,
        vec!["P", "Q", "Q", "Q", "Q", "Q", "R", "Q"]
    );
    assert_eq!(report.failed_queries, queries(&["Q"]));
    assert_eq!(report.queries_attempted, 4);
    assert_eq!(
        harvester.store().load_failed().unwrap(),
        vec![CandidateQuery::from("Q")]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_query_recovered_in_retry_pass() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("PQ", &db, "max-retries = 2");
    let endpoint = FakeEndpoint::new(&log).then(
        "Q",
        vec![transient(), transient(), records(&[("QAN", "Qantas")])],
    );

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    // Results found in the retry pass are kept but not expanded
    assert_eq!(log.fetches(), vec!["P", "Q", "Q", "Q"]);
    assert_eq!(report.entries, vec![Entry::new("QAN", None, "Qantas")]);
    assert!(report.failed_queries.is_empty());
    assert!(harvester.store().load_failed().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_abort_in_retry_pass_checkpoints_phase_and_reissues() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("PQR", &db, "max-retries = 2");
    let endpoint = FakeEndpoint::new(&log).then(
        "Q",
        vec![
            transient(),
            transient(),
            session_abort(),
            records(&[("QAN", "Qantas")]),
        ],
    );

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    assert_eq!(
        log.events(),
        vec![
            "refresh",
            "fetch:P",
            "fetch:Q",
            "fetch:Q",
            "fetch:R",
            "fetch:Q",
            "invalidate@Q resuming (retry-pass)",
            "refresh",
            "fetch:Q",
        ]
    );
    assert_eq!(report.entries, vec![Entry::new("QAN", None, "Qantas")]);
    assert!(report.failed_queries.is_empty());
    assert!(harvester.store().load_failed().unwrap().is_empty());
    assert!(harvester.store().load_checkpoint().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_resume_continues_at_next_candidate() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let config = config("ABCD", &db, "");

    let first_log = Log::default();
    let control = Arc::new(HarvestControl::new());
    let endpoint =
        FakeEndpoint::new(&first_log).always("B", records(&[("BHP", "BHP Group")]));
    let mut first = harvester(&config, &db, endpoint, FakeSession::new(&first_log, &db))
        .with_control(Arc::clone(&control))
        .with_sink(Box::new(StopAfter {
            control: Arc::clone(&control),
            query: "B",
        }));

    let outcome = first.start(false).await.unwrap();
    assert_eq!(
        outcome,
        HarvestOutcome::Stopped {
            checkpoint: Some(CandidateQuery::from("BA"))
        }
    );
    assert_eq!(first_log.fetches(), vec!["A", "B"]);
    assert!(!control.is_running());
    let run = first.store().get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Interrupted);
    drop(first);

    let second_log = Log::default();
    let endpoint = FakeEndpoint::new(&second_log);
    let mut second = harvester(&config, &db, endpoint, FakeSession::new(&second_log, &db));
    let report = completed(second.start(true).await.unwrap());

    assert_eq!(
        second_log.fetches(),
        vec!["BA", "BB", "BC", "BD", "C", "D"]
    );
    assert!(report.resumed);
    assert_eq!(report.entries, vec![Entry::new("BHP", None, "BHP Group")]);
    assert!(second.store().load_checkpoint().unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resume_after_restart_reattempts_checkpointed_query_once() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let config = config("ABCD", &db, "");

    {
        let mut storage = SqliteStorage::new(&db).unwrap();
        storage
            .record_entries(&[Entry::new("ANZ", None, "ANZ Group")])
            .unwrap();
        storage
            .save_checkpoint(
                &Checkpoint::new(Some("C".into()), HarvestPhase::Enumerating, "hash").resuming(),
            )
            .unwrap();
    }

    let log = Log::default();
    let endpoint = FakeEndpoint::new(&log).always("C", records(&[("CBA", "Commonwealth Bank")]));
    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(true).await.unwrap());

    assert_eq!(log.fetches(), vec!["C", "CA", "CB", "CC", "CD", "D"]);
    assert_eq!(
        report.entries,
        vec![
            Entry::new("ANZ", None, "ANZ Group"),
            Entry::new("CBA", None, "Commonwealth Bank"),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fresh_start_discards_stored_progress() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let config = config("AB", &db, "");

    {
        let mut storage = SqliteStorage::new(&db).unwrap();
        storage
            .record_entries(&[Entry::new("ANZ", None, "ANZ Group")])
            .unwrap();
        storage
            .save_checkpoint(&Checkpoint::new(Some("B".into()), HarvestPhase::Enumerating, "hash"))
            .unwrap();
    }

    let log = Log::default();
    let mut harvester = harvester(&config, &db, FakeEndpoint::new(&log), FakeSession::new(&log, &db));
    let report = completed(harvester.start(false).await.unwrap());

    assert_eq!(log.fetches(), vec!["A", "B"]);
    assert!(report.entries.is_empty());
    assert!(!report.resumed);
}

#[tokio::test(start_paused = true)]
async fn test_resume_inside_retry_pass_skips_earlier_failures() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let config = config("ABCD", &db, "");

    {
        let mut storage = SqliteStorage::new(&db).unwrap();
        storage.record_failed(&"A".into()).unwrap();
        storage.record_failed(&"C".into()).unwrap();
        storage.record_failed(&"D".into()).unwrap();
        storage
            .save_checkpoint(&Checkpoint::new(Some("C".into()), HarvestPhase::RetryPass, "hash"))
            .unwrap();
    }

    let log = Log::default();
    let endpoint = FakeEndpoint::new(&log).always("D", transient());
    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let report = completed(harvester.start(true).await.unwrap());

    assert_eq!(log.fetches(), vec!["C", "D"]);
    assert_eq!(report.failed_queries, queries(&["A", "D"]));
}

#[tokio::test(start_paused = true)]
async fn test_second_start_while_running_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let first_db = dir.path().join("first.db");
    let second_db = dir.path().join("second.db");
    let control = Arc::new(HarvestControl::new());

    let first_log = Log::default();
    let mut first = harvester(
        &config("AB", &first_db, ""),
        &first_db,
        FakeEndpoint::new(&first_log),
        FakeSession::new(&first_log, &first_db),
    )
    .with_control(Arc::clone(&control));

    let second_log = Log::default();
    let mut second = harvester(
        &config("AB", &second_db, ""),
        &second_db,
        FakeEndpoint::new(&second_log),
        FakeSession::new(&second_log, &second_db),
    )
    .with_control(Arc::clone(&control));

    let (first_outcome, second_outcome) = tokio::join!(first.start(false), second.start(false));

    assert!(matches!(first_outcome.unwrap(), HarvestOutcome::Completed(_)));
    assert_eq!(second_outcome.unwrap(), HarvestOutcome::AlreadyRunning);
    assert!(second_log.events().is_empty());
    assert!(!control.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_halts_and_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("ABCD", &db, "");
    let endpoint = FakeEndpoint::new(&log)
        .always("A", records(&[("ANZ", "ANZ Group")]))
        .always("C", session_abort());
    let session = FakeSession::new(&log, &db).failing_after(1);

    let mut harvester = harvester(&config, &db, endpoint, session);
    let err = harvester.start(false).await.unwrap_err();

    assert!(matches!(err, HarvestError::SessionRefresh(_)));
    assert!(err.is_fatal());
    assert!(!log.fetches().contains(&"D".to_string()));

    let checkpoint = harvester.store().load_checkpoint().unwrap().unwrap();
    assert_eq!(checkpoint.last_attempted_query, Some("C".into()));
    assert!(checkpoint.resuming);
    assert_eq!(harvester.store().count_entries().unwrap(), 1);
    let run = harvester.store().get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_recovery_limit_halts_run() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let log = Log::default();
    let config = config("AB", &db, "max-consecutive-recoveries = 2");
    let endpoint = FakeEndpoint::new(&log).always("B", session_abort());

    let mut harvester = harvester(&config, &db, endpoint, FakeSession::new(&log, &db));
    let err = harvester.start(false).await.unwrap_err();

    assert!(matches!(err, HarvestError::RecoveryLimit { recoveries: 2, .. }));
    assert_eq!(log.fetches(), vec!["A", "B", "B", "B"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_cooldown_resumes_at_failing_query() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let config = config("ABCD", &db, "");

    let first_log = Log::default();
    let endpoint = FakeEndpoint::new(&first_log).always("B", session_abort());
    let mut first = harvester(&config, &db, endpoint, FakeSession::new(&first_log, &db));

    let control = first.control();
    tokio::spawn(async move {
        // Two paced requests take 2s; the cooldown lasts 120s
        tokio::time::sleep(Duration::from_secs(30)).await;
        control.stop();
    });

    let started = tokio::time::Instant::now();
    let outcome = first.start(false).await.unwrap();
    assert_eq!(
        outcome,
        HarvestOutcome::Stopped {
            checkpoint: Some("B".into())
        }
    );
    assert!(started.elapsed() < Duration::from_secs(120));
    drop(first);

    let second_log = Log::default();
    let mut second = harvester(
        &config,
        &db,
        FakeEndpoint::new(&second_log),
        FakeSession::new(&second_log, &db),
    );
    completed(second.start(true).await.unwrap());

    assert_eq!(second_log.fetches(), vec!["B", "C", "D"]);
}
