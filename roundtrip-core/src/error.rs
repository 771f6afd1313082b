use std::fmt;

/// Top-level harness error type.
///
/// All fallible operations in `roundtrip-core` return [`Result<T, HarnessError>`](Result).
/// Each variant wraps a domain-specific error enum, allowing callers to
/// match on the error source without losing type information.
#[derive(thiserror::Error, Debug)]
pub enum HarnessError {
    /// Error from the store client (connectivity, auth, statement).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error in configuration parsing or validation, including dimension pinning.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error communicating with an embedding provider.
    #[error("Embedding error: {0}")]
    Embed(#[from] EmbedError),

    /// Fixture catalog could not be constructed.
    #[error("Fixture error: {0}")]
    Fixture(#[from] FixtureError),

    /// Ingestion aborted mid-phase.
    #[error("Ingestion failed: {0}")]
    Ingestion(#[from] IngestionError),

    /// A single test case's assertion did not hold.
    #[error("Case failed: {0}")]
    Case(#[from] CaseError),

    /// The rendered report could not be written.
    #[error("Report write error: {0}")]
    Report(#[from] ReportError),
}

/// How far an error propagates through a harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the whole run immediately; no further cases, no report.
    Fatal,
    /// Stop the run after recording the failing case; partial report is written.
    AbortRun,
    /// Recorded on the failing case only; the run continues.
    CaseLocal,
}

impl HarnessError {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Store(e) => match e.kind() {
                StoreErrorKind::Connectivity | StoreErrorKind::Auth => Severity::Fatal,
                StoreErrorKind::Statement => Severity::CaseLocal,
            },
            Self::Config(_) | Self::Fixture(_) => Severity::Fatal,
            Self::Ingestion(_) => Severity::AbortRun,
            Self::Embed(_) | Self::Case(_) | Self::Report(_) => Severity::CaseLocal,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

/// The three failure kinds a store client distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    Connectivity,
    Auth,
    Statement,
}

/// Errors surfaced by a [`crate::store::StoreClient`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The store could not be reached (DNS, refused connection, timeout, 5xx).
    #[error("store unreachable: {0}")]
    Connectivity(String),

    /// The store rejected the supplied credentials.
    #[error("credentials rejected: {0}")]
    Auth(String),

    /// The statement was malformed or violated a constraint.
    #[error("statement failed [{code}]: {message}")]
    Statement {
        /// Store-specific error code (Neo4j status code or `SQLite` result code).
        code: String,
        /// Store-provided message.
        message: String,
    },

    /// A returned row did not have the expected shape.
    #[error("unexpected row shape: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::Connectivity(_) => StoreErrorKind::Connectivity,
            Self::Auth(_) => StoreErrorKind::Auth,
            Self::Statement { .. } | Self::Decode(_) => StoreErrorKind::Statement,
        }
    }

    pub(crate) fn statement(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Statement {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(ffi, _)
                if ffi.code == rusqlite::ErrorCode::CannotOpen =>
            {
                Self::Connectivity(err.to_string())
            }
            rusqlite::Error::SqliteFailure(ffi, _) => {
                Self::statement(format!("SQLITE_{}", ffi.extended_code), err.to_string())
            }
            _ => Self::statement("SQLITE", err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors in harness configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist at the expected path.
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// A required value is missing or empty.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Two dimensionalities that must agree for this run do not.
    #[error("Dimension mismatch: {context} has {actual} dimensions, run is pinned to {expected}")]
    DimensionMismatch {
        /// The pinned dimensionality for this run.
        expected: usize,
        /// The dimensionality that was observed.
        actual: usize,
        /// Where the conflicting dimensionality came from.
        context: String,
    },
}

/// Errors from embedding provider interactions.
#[derive(thiserror::Error, Debug)]
pub enum EmbedError {
    /// Network-level failure connecting to the provider.
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned a non-success HTTP status.
    #[error("API error (HTTP {status}): {body}")]
    ApiError {
        /// HTTP status code from the provider.
        status: u16,
        /// Response body text.
        body: String,
    },

    /// Provider response could not be parsed into the expected format.
    #[error("Response parse error: {0}")]
    Parse(String),
}

/// Errors constructing or loading a fixture catalog.
#[derive(thiserror::Error, Debug)]
pub enum FixtureError {
    #[error("duplicate entity id `{0}`")]
    DuplicateEntity(String),

    #[error("relationship #{index} references unknown entity `{id}`")]
    DanglingReference { index: usize, id: String },

    #[error("relationship #{index} repeats {edge}")]
    DuplicateRelationship { index: usize, edge: String },

    #[error("entity `{id}` sets reserved property `{key}`")]
    ReservedProperty { id: String, key: String },

    #[error("probe references unknown entity `{0}`")]
    UnknownProbe(String),

    #[error("traversal plan must have between {min} and {max} hops, got {actual}")]
    HopCount { min: usize, max: usize, actual: usize },

    #[error("cannot read fixture {path}: {message}")]
    Load { path: String, message: String },

    #[error("cannot parse fixture: {0}")]
    Parse(String),
}

/// Which ingestion phase an abort happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Entities,
    Relationships,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entities => f.write_str("entity"),
            Self::Relationships => f.write_str("relationship"),
        }
    }
}

/// A load phase was aborted. Carries the offending catalog index.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{phase} load aborted at index {index} (`{key}`): {reason}")]
pub struct IngestionError {
    pub phase: IngestPhase,
    pub index: usize,
    pub key: String,
    pub reason: String,
}

/// A single case's check did not hold.
#[derive(thiserror::Error, Debug)]
pub enum CaseError {
    /// An observed value differed from the expected one.
    #[error("{what}: expected {expected}, got {actual}")]
    Mismatch {
        what: String,
        expected: String,
        actual: String,
    },

    /// The case did not finish within its bound.
    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The run finished but not every declared case passed.
    #[error("{passed}/{total} tests passed")]
    Unsuccessful { passed: usize, total: usize },
}

impl CaseError {
    pub fn mismatch(
        what: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self::Mismatch {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Errors writing the rendered report.
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    /// Filesystem I/O error creating or writing the temp file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The temp file could not be renamed over the destination.
    #[error("cannot replace {path}: {message}")]
    Persist { path: String, message: String },
}

/// Convenience alias for `Result<T, HarnessError>`.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_classify_by_kind() {
        assert_eq!(
            StoreError::Connectivity("refused".into()).kind(),
            StoreErrorKind::Connectivity
        );
        assert_eq!(StoreError::Auth("401".into()).kind(), StoreErrorKind::Auth);
        assert_eq!(
            StoreError::statement("X", "bad").kind(),
            StoreErrorKind::Statement
        );
        assert_eq!(
            StoreError::Decode("no column".into()).kind(),
            StoreErrorKind::Statement
        );
    }

    #[test]
    fn severity_follows_error_policy() {
        let fatal = HarnessError::Store(StoreError::Auth("nope".into()));
        assert_eq!(fatal.severity(), Severity::Fatal);

        let config = HarnessError::Config(ConfigError::Missing("store.uri"));
        assert!(config.is_fatal());

        let ingest = HarnessError::Ingestion(IngestionError {
            phase: IngestPhase::Relationships,
            index: 4,
            key: "a->b".into(),
            reason: "no edge created".into(),
        });
        assert_eq!(ingest.severity(), Severity::AbortRun);

        let statement = HarnessError::Store(StoreError::statement("X", "syntax"));
        assert_eq!(statement.severity(), Severity::CaseLocal);

        let case = HarnessError::Case(CaseError::mismatch("count", 9, 8));
        assert_eq!(case.severity(), Severity::CaseLocal);
    }

    #[test]
    fn sqlite_cannot_open_maps_to_connectivity() {
        let err = rusqlite::Connection::open("/nonexistent-dir/for/sure/store.db")
            .map_err(StoreError::from)
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Connectivity);
    }

    #[test]
    fn ingestion_error_names_phase_and_index() {
        let err = IngestionError {
            phase: IngestPhase::Entities,
            index: 2,
            key: "dr-chen".into(),
            reason: "constraint".into(),
        };
        assert_eq!(
            err.to_string(),
            "entity load aborted at index 2 (`dr-chen`): constraint"
        );
    }
}
