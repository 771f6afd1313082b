// Integration test utilities: a file-backed reference store and out-of-band tampering.

use std::path::{Path, PathBuf};

use roundtrip_core::config::RoundtripConfig;
use roundtrip_core::embed::{Embedder, MockEmbedder};
use roundtrip_core::error::EmbedError;
use roundtrip_core::fixture::FixtureCatalog;
use roundtrip_core::harness::{Harness, RunOutcome, TestCase};
use roundtrip_core::progress::NoopReporter;
use roundtrip_core::store::SqliteStore;
use roundtrip_core::types::EdgeTuple;

/// A `SQLite` store file in a temporary directory, plus the config pointing at it.
#[derive(Debug)]
pub struct TestStore {
    pub dir: tempfile::TempDir,
    pub config: RoundtripConfig,
}

impl TestStore {
    /// Store for `namespace` with the run pinned to `dimensions`.
    pub fn new(namespace: &str, dimensions: usize) -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let db = dir.path().join("store.db");

        let mut config = RoundtripConfig::default();
        config.store.uri = format!("sqlite://{}", db.display());
        config.store.password = "test".into();
        config.store.namespace = namespace.into();
        config.embedding.dimensions = dimensions;
        config.schema.index_poll_interval_ms = 10;
        config.report.path = dir.path().join("test_results.md");

        Self { dir, config }
    }

    /// Database file named by the store URI, which tests may repoint at another store.
    pub fn db_path(&self) -> PathBuf {
        self.config
            .store
            .uri
            .strip_prefix("sqlite://")
            .map_or_else(|| self.dir.path().join("store.db"), PathBuf::from)
    }

    pub fn report_path(&self) -> &Path {
        &self.config.report.path
    }

    /// A fresh session. The harness closes its session, so each run needs one.
    pub fn session(&self) -> SqliteStore {
        SqliteStore::open(&self.db_path(), &self.config.store.namespace).expect("open sqlite store")
    }

    /// Mock embedder matching the pinned dimensionality.
    pub fn embedder(&self) -> MockEmbedder {
        MockEmbedder::new(self.config.embedding.dimensions, self.config.embedding.mock_seed)
    }

    /// Run the standard cases with the built-in catalog.
    pub async fn run(&self) -> RunOutcome {
        self.run_with(&self.embedder())
            .await
            .expect("run without fatal errors")
    }

    pub async fn run_with(
        &self,
        embedder: &dyn Embedder,
    ) -> roundtrip_core::error::Result<RunOutcome> {
        let harness = Harness::new(self.config.clone(), FixtureCatalog::health_care());
        harness.run(&self.session(), embedder, &NoopReporter).await
    }

    /// Run only `cases`, in order, against a fresh session.
    pub async fn run_cases(&self, cases: Vec<Box<dyn TestCase>>) -> RunOutcome {
        let harness =
            Harness::with_cases(self.config.clone(), FixtureCatalog::health_care(), cases);
        harness
            .run(&self.session(), &self.embedder(), &NoopReporter)
            .await
            .expect("run without fatal errors")
    }

    /// Run only `cases`, in order, embedding with `embedder`.
    pub async fn run_cases_with(
        &self,
        embedder: &dyn Embedder,
        cases: Vec<Box<dyn TestCase>>,
    ) -> RunOutcome {
        let harness =
            Harness::with_cases(self.config.clone(), FixtureCatalog::health_care(), cases);
        harness
            .run(&self.session(), embedder, &NoopReporter)
            .await
            .expect("run without fatal errors")
    }

    fn raw(&self) -> rusqlite::Connection {
        rusqlite::Connection::open(self.db_path()).expect("open raw connection")
    }

    /// Delete one stored copy of `edge` behind the harness's back.
    pub fn delete_edge(&self, edge: &EdgeTuple) -> usize {
        self.raw()
            .execute(
                "DELETE FROM relationships WHERE id = (
                     SELECT id FROM relationships
                     WHERE namespace = ?1 AND source = ?2 AND kind = ?3 AND target = ?4
                     LIMIT 1)",
                rusqlite::params![
                    self.config.store.namespace,
                    edge.source.as_str(),
                    edge.kind.as_str(),
                    edge.target.as_str()
                ],
            )
            .expect("delete edge")
    }

    /// Insert a second copy of `edge` behind the harness's back.
    pub fn duplicate_edge(&self, edge: &EdgeTuple) -> usize {
        self.raw()
            .execute(
                "INSERT INTO relationships (namespace, source, kind, target)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    self.config.store.namespace,
                    edge.source.as_str(),
                    edge.kind.as_str(),
                    edge.target.as_str()
                ],
            )
            .expect("duplicate edge")
    }

    /// Replace one entity's embedding with a vector of the wrong length.
    pub fn truncate_embedding(&self, id: &str, length: usize) -> usize {
        let vector = format!("[{}]", vec!["0.5"; length].join(","));
        self.raw()
            .execute(
                "UPDATE entities SET embedding = ?1 WHERE namespace = ?2 AND id = ?3",
                rusqlite::params![vector, self.config.store.namespace, id],
            )
            .expect("truncate embedding")
    }

    /// Stored embedding lengths for every entity in the namespace.
    pub fn embedding_lengths(&self) -> Vec<(String, i64)> {
        let conn = self.raw();
        let mut stmt = conn
            .prepare(
                "SELECT id, COALESCE(json_array_length(embedding), 0) FROM entities
                 WHERE namespace = ?1 ORDER BY id",
            )
            .expect("prepare");
        let lengths = stmt
            .query_map(rusqlite::params![self.config.store.namespace], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .expect("query embeddings")
            .collect::<Result<_, _>>()
            .expect("read embeddings");
        lengths
    }
}

/// Mock embedder that fails for any text containing `marker`.
#[derive(Debug)]
pub struct FailingEmbedder {
    pub inner: MockEmbedder,
    pub marker: String,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing-mock"
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> roundtrip_core::error::Result<Vec<f32>> {
        if text.contains(&self.marker) {
            return Err(EmbedError::ApiError {
                status: 503,
                body: "embedding service unavailable".into(),
            }
            .into());
        }
        self.inner.embed(text).await
    }
}

/// Mock embedder that maps every text in `cluster` to the same unit vector,
/// so similarity alone cannot tell those texts apart.
#[derive(Debug)]
pub struct ClusteringEmbedder {
    pub inner: MockEmbedder,
    pub cluster: Vec<String>,
}

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl Embedder for ClusteringEmbedder {
    fn name(&self) -> &str {
        "clustering-mock"
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> roundtrip_core::error::Result<Vec<f32>> {
        if self.cluster.iter().any(|t| t == text) {
            let mut axis = vec![0.0; self.inner.dimensions()];
            axis[0] = 1.0;
            return Ok(axis);
        }
        self.inner.embed(text).await
    }
}
