pub mod cases;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RoundtripConfig;
use crate::embed::Embedder;
use crate::error::{CaseError, HarnessError, IngestionError, Severity};
use crate::fixture::FixtureCatalog;
use crate::progress::ProgressReporter;
use crate::store::StoreClient;

pub use cases::standard_cases;

/// Lifecycle of one case: Pending → Running → Passed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl CaseStatus {
    /// Transitions only move forward; terminal states never change.
    pub fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Passed | Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    fn advance(&mut self, next: Self) {
        debug_assert!(self.can_become(next), "illegal case transition {self:?} -> {next:?}");
        *self = next;
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Passed => "PASS",
            Self::Failed => "FAIL",
        }
    }
}

/// Recorded result of one executed case.
#[derive(Debug, Clone)]
pub struct CaseOutcome {
    /// 1-based position in the declared case list.
    pub position: usize,
    pub name: String,
    pub description: String,
    pub status: CaseStatus,
    pub elapsed: Duration,
    /// What the case observed when it passed.
    pub detail: String,
    /// Captured error when it failed.
    pub failure: Option<String>,
}

/// Why a run stopped before its last declared case.
#[derive(Debug, Clone)]
pub struct RunAbort {
    /// Name of the case that stopped the run.
    pub case: String,
    pub cause: IngestionError,
}

impl std::fmt::Display for RunAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stopped the run: {}", self.case, self.cause)
    }
}

/// Everything a finished (or partially finished) run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<CaseOutcome>,
    /// Number of declared cases, executed or not.
    pub declared: usize,
    /// Set when an ingestion failure stopped the run early.
    pub aborted: Option<RunAbort>,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn passed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == CaseStatus::Passed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == CaseStatus::Failed)
            .count()
    }

    /// True only when every declared case ran and passed.
    pub fn all_passed(&self) -> bool {
        self.aborted.is_none() && self.passed() == self.declared
    }
}

/// Shared, read-only context handed to every case.
#[derive(Debug, Clone, Copy)]
pub struct CaseContext<'a> {
    pub store: &'a dyn StoreClient,
    pub embedder: &'a dyn Embedder,
    pub catalog: &'a FixtureCatalog,
    pub config: &'a RoundtripConfig,
}

/// One verification step. Returns a short description of what it observed.
#[async_trait::async_trait]
pub trait TestCase: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String>;
}

/// Ordered case runner.
pub struct Harness {
    config: RoundtripConfig,
    catalog: FixtureCatalog,
    cases: Vec<Box<dyn TestCase>>,
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.cases.iter().map(|c| c.name()).collect();
        f.debug_struct("Harness")
            .field("namespace", &self.config.store.namespace)
            .field("cases", &names)
            .finish_non_exhaustive()
    }
}

impl Harness {
    /// Harness running the six standard cases.
    pub fn new(config: RoundtripConfig, catalog: FixtureCatalog) -> Self {
        Self::with_cases(config, catalog, standard_cases())
    }

    pub fn with_cases(
        config: RoundtripConfig,
        catalog: FixtureCatalog,
        cases: Vec<Box<dyn TestCase>>,
    ) -> Self {
        Self {
            config,
            catalog,
            cases,
        }
    }

    pub fn config(&self) -> &RoundtripConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FixtureCatalog {
        &self.catalog
    }

    pub fn case_names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.name()).collect()
    }

    /// Run every case in order against `store`, then close the session.
    ///
    /// Returns `Err` only for fatal errors (connectivity, auth, config); case
    /// failures and ingestion aborts are recorded in the [`RunOutcome`].
    pub async fn run(
        &self,
        store: &dyn StoreClient,
        embedder: &dyn Embedder,
        progress: &dyn ProgressReporter,
    ) -> crate::error::Result<RunOutcome> {
        let result = self.run_cases(store, embedder, progress).await;
        if let Err(e) = store.close().await {
            warn!(error = %e, "Failed to close store session");
        }
        result
    }

    async fn run_cases(
        &self,
        store: &dyn StoreClient,
        embedder: &dyn Embedder,
        progress: &dyn ProgressReporter,
    ) -> crate::error::Result<RunOutcome> {
        let ctx = CaseContext {
            store,
            embedder,
            catalog: &self.catalog,
            config: &self.config,
        };
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let limit_secs = self.config.harness.case_timeout_secs;
        let limit = Duration::from_secs(limit_secs);

        info!(%run_id, cases = self.cases.len(), endpoint = %store.endpoint(), "Run started");
        progress.run_started(self.cases.len());

        let mut outcomes = Vec::with_capacity(self.cases.len());
        let mut aborted = None;

        for (i, case) in self.cases.iter().enumerate() {
            let position = i + 1;
            let mut status = CaseStatus::Pending;
            status.advance(CaseStatus::Running);
            progress.case_started(position, case.name());
            info!(position, case = case.name(), "Case running");

            let t0 = Instant::now();
            let result = match tokio::time::timeout(limit, case.run(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(HarnessError::Case(CaseError::Timeout {
                    seconds: limit_secs,
                })),
            };
            let elapsed = t0.elapsed();

            let (detail, failure, stop) = match result {
                Ok(detail) => {
                    status.advance(CaseStatus::Passed);
                    info!(position, case = case.name(), ms = elapsed.as_millis(), "Case passed");
                    (detail, None, false)
                }
                Err(e) => match e.severity() {
                    Severity::Fatal => {
                        error!(position, case = case.name(), error = %e, "Fatal error, aborting run");
                        progress.run_finished();
                        return Err(e);
                    }
                    Severity::AbortRun => {
                        status.advance(CaseStatus::Failed);
                        warn!(position, case = case.name(), error = %e, "Case failed, stopping run");
                        let failure = e.to_string();
                        if let HarnessError::Ingestion(cause) = e {
                            aborted = Some(RunAbort {
                                case: case.name().to_string(),
                                cause,
                            });
                        }
                        (String::new(), Some(failure), true)
                    }
                    Severity::CaseLocal => {
                        status.advance(CaseStatus::Failed);
                        warn!(position, case = case.name(), error = %e, "Case failed");
                        (String::new(), Some(e.to_string()), false)
                    }
                },
            };

            let outcome = CaseOutcome {
                position,
                name: case.name().to_string(),
                description: case.description().to_string(),
                status,
                elapsed,
                detail,
                failure,
            };
            progress.case_finished(&outcome);
            outcomes.push(outcome);

            if stop {
                break;
            }
        }

        progress.run_finished();
        let outcome = RunOutcome {
            run_id,
            started_at,
            outcomes,
            declared: self.cases.len(),
            aborted,
            elapsed: clock.elapsed(),
        };
        info!(
            passed = outcome.passed(),
            declared = outcome.declared,
            ms = outcome.elapsed.as_millis(),
            "Run finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::embed::MockEmbedder;
    use crate::error::{IngestPhase, IngestionError, StoreError};
    use crate::progress::NoopReporter;
    use crate::store::{SqliteStore, Statement};

    #[derive(Debug, Clone, Copy)]
    enum Behaviour {
        Pass,
        Fail,
        Abort,
        Fatal,
        Hang,
    }

    struct Scripted {
        name: String,
        behaviour: Behaviour,
    }

    #[async_trait::async_trait]
    impl TestCase for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "scripted"
        }

        async fn run(&self, _ctx: &CaseContext<'_>) -> crate::error::Result<String> {
            match self.behaviour {
                Behaviour::Pass => Ok("ok".into()),
                Behaviour::Fail => Err(CaseError::mismatch("count", 1, 2).into()),
                Behaviour::Abort => Err(IngestionError {
                    phase: IngestPhase::Entities,
                    index: 3,
                    key: "x".into(),
                    reason: "boom".into(),
                }
                .into()),
                Behaviour::Fatal => Err(StoreError::Auth("denied".into()).into()),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
            }
        }
    }

    fn harness(script: &[Behaviour]) -> Harness {
        let mut config = RoundtripConfig::default();
        config.harness.case_timeout_secs = 1;
        let cases = script
            .iter()
            .enumerate()
            .map(|(i, b)| {
                Box::new(Scripted {
                    name: format!("case-{}", i + 1),
                    behaviour: *b,
                }) as Box<dyn TestCase>
            })
            .collect();
        Harness::with_cases(config, FixtureCatalog::health_care(), cases)
    }

    async fn run(script: &[Behaviour]) -> (crate::error::Result<RunOutcome>, SqliteStore) {
        let store = SqliteStore::in_memory("h").unwrap();
        let embedder = MockEmbedder::new(8, 1);
        let result = harness(script)
            .run(&store, &embedder, &NoopReporter)
            .await;
        (result, store)
    }

    #[test]
    fn status_transitions_are_one_directional() {
        assert!(CaseStatus::Pending.can_become(CaseStatus::Running));
        assert!(CaseStatus::Running.can_become(CaseStatus::Failed));
        assert!(!CaseStatus::Passed.can_become(CaseStatus::Failed));
        assert!(!CaseStatus::Pending.can_become(CaseStatus::Passed));
        assert!(!CaseStatus::Failed.can_become(CaseStatus::Running));
        assert!(CaseStatus::Failed.is_terminal());
    }

    #[tokio::test]
    async fn case_failure_is_local() {
        let (result, _) = run(&[Behaviour::Pass, Behaviour::Fail, Behaviour::Pass]).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.outcomes.len(), 3);
        assert_eq!(outcome.passed(), 2);
        assert_eq!(outcome.failed(), 1);
        assert!(!outcome.all_passed());
        assert!(outcome.outcomes[1].failure.as_deref().unwrap().contains("count"));
        let positions: Vec<usize> = outcome.outcomes.iter().map(|o| o.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn ingestion_abort_stops_run_with_partial_outcomes() {
        let (result, _) = run(&[Behaviour::Pass, Behaviour::Abort, Behaviour::Pass]).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.outcomes.len(), 2);
        assert_eq!(outcome.declared, 3);
        let abort = outcome.aborted.as_ref().unwrap();
        assert_eq!(abort.case, "case-2");
        assert_eq!(abort.cause.index, 3);
        assert!(abort.to_string().contains("index 3"));
        assert!(!outcome.all_passed());
    }

    #[tokio::test]
    async fn fatal_error_aborts_and_closes_session() {
        let (result, store) = run(&[Behaviour::Fatal, Behaviour::Pass]).await;
        assert!(result.unwrap_err().is_fatal());
        let err = store.execute(&Statement::Ping).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::StoreErrorKind::Connectivity);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_case_times_out_and_run_continues() {
        let (result, _) = run(&[Behaviour::Hang, Behaviour::Pass]).await;
        let outcome = result.unwrap();
        assert_eq!(outcome.outcomes[0].status, CaseStatus::Failed);
        assert!(outcome.outcomes[0].failure.as_deref().unwrap().contains("timed out"));
        assert_eq!(outcome.outcomes[1].status, CaseStatus::Passed);
    }

    #[tokio::test]
    async fn progress_sees_every_transition() {
        #[derive(Default)]
        struct Recorder(Mutex<Vec<String>>);
        impl ProgressReporter for Recorder {
            fn run_started(&self, total: usize) {
                self.0.lock().unwrap().push(format!("start {total}"));
            }
            fn case_started(&self, position: usize, _name: &str) {
                self.0.lock().unwrap().push(format!("run {position}"));
            }
            fn case_finished(&self, outcome: &CaseOutcome) {
                self.0
                    .lock()
                    .unwrap()
                    .push(format!("{} {}", outcome.status.as_str(), outcome.position));
            }
            fn run_finished(&self) {
                self.0.lock().unwrap().push("end".into());
            }
        }

        let store = SqliteStore::in_memory("h").unwrap();
        let recorder = Recorder::default();
        harness(&[Behaviour::Pass, Behaviour::Fail])
            .run(&store, &MockEmbedder::new(8, 1), &recorder)
            .await
            .unwrap();
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start 2", "run 1", "PASS 1", "run 2", "FAIL 2", "end"]
        );
    }
}
