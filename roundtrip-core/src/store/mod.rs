pub mod neo4j;
pub mod schema;
pub mod sqlite;

use serde_json::{Map, Value};

use crate::config::StoreSection;
use crate::error::{ConfigError, StoreError};
use crate::types::{EntityId, EntityRecord, Hop, RelationKind, SimilarityFunction};

pub use neo4j::Neo4jHttpStore;
pub use sqlite::SqliteStore;

/// Label every harness-written node carries in a property-graph backend.
pub const ENTITY_LABEL: &str = "HarnessEntity";

/// The closed vocabulary of statements the harness issues.
///
/// Each backend translates a statement into its own parameterised query text.
/// The session namespace is bound by the client, never by the caller, so every
/// write and read is scoped to the run's namespace.
///
/// Result columns per statement:
///
/// | Statement | Columns |
/// |-----------|---------|
/// | `Ping` | `ok` |
/// | `ResetNamespace` | `deleted` |
/// | `DescribeIndex` | `name`, `state`, `dimensions`, `similarity` (zero or one row) |
/// | `DropIndex`, `CreateIndex` | none |
/// | `UpsertEntities` | `id`, one row per written entity |
/// | `CreateRelationship` | `created` |
/// | `CountEntities`, `CountRelationships` | `count` |
/// | `VectorSearch` | `id`, `name`, `kind`, `score` |
/// | `Neighbors` | `direction`, `kind`, `id` |
/// | `Traverse` | `id` |
/// | `EmbeddingMismatches` | `mismatches`, `ids` |
/// | `ListEdges` | `source`, `kind`, `target` |
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Ping,
    /// Delete every entity (and attached edge) in the namespace.
    ResetNamespace,
    DescribeIndex {
        name: String,
    },
    DropIndex {
        name: String,
    },
    CreateIndex {
        name: String,
        dimensions: usize,
        similarity: SimilarityFunction,
    },
    /// Idempotent write keyed on entity id.
    UpsertEntities {
        records: Vec<EntityRecord>,
    },
    /// Idempotent edge write; `created` is 1 when the edge exists afterwards.
    CreateRelationship {
        source: EntityId,
        kind: RelationKind,
        target: EntityId,
    },
    CountEntities,
    CountRelationships,
    VectorSearch {
        index: String,
        vector: Vec<f32>,
        top_k: usize,
    },
    /// Adjacent entities in both directions.
    Neighbors {
        id: EntityId,
    },
    /// Entities reachable from `start` along exactly `hops`.
    Traverse {
        start: EntityId,
        hops: Vec<Hop>,
    },
    /// Entities whose embedding is missing or not `dimensions` long.
    EmbeddingMismatches {
        dimensions: usize,
    },
    ListEdges,
}

impl Statement {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ResetNamespace => "reset_namespace",
            Self::DescribeIndex { .. } => "describe_index",
            Self::DropIndex { .. } => "drop_index",
            Self::CreateIndex { .. } => "create_index",
            Self::UpsertEntities { .. } => "upsert_entities",
            Self::CreateRelationship { .. } => "create_relationship",
            Self::CountEntities => "count_entities",
            Self::CountRelationships => "count_relationships",
            Self::VectorSearch { .. } => "vector_search",
            Self::Neighbors { .. } => "neighbors",
            Self::Traverse { .. } => "traverse",
            Self::EmbeddingMismatches { .. } => "embedding_mismatches",
            Self::ListEdges => "list_edges",
        }
    }
}

/// One result row: column name to JSON value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Result<&Value, StoreError> {
        self.0
            .get(column)
            .ok_or_else(|| StoreError::Decode(format!("missing column `{column}`")))
    }

    pub fn get_str(&self, column: &str) -> Result<&str, StoreError> {
        self.get(column)?
            .as_str()
            .ok_or_else(|| StoreError::Decode(format!("column `{column}` is not a string")))
    }

    pub fn get_u64(&self, column: &str) -> Result<u64, StoreError> {
        self.get(column)?
            .as_u64()
            .ok_or_else(|| StoreError::Decode(format!("column `{column}` is not a count")))
    }

    pub fn get_f64(&self, column: &str) -> Result<f64, StoreError> {
        self.get(column)?
            .as_f64()
            .ok_or_else(|| StoreError::Decode(format!("column `{column}` is not a number")))
    }

    pub fn get_str_list(&self, column: &str) -> Result<Vec<String>, StoreError> {
        let items = self
            .get(column)?
            .as_array()
            .ok_or_else(|| StoreError::Decode(format!("column `{column}` is not a list")))?;
        items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    StoreError::Decode(format!("column `{column}` holds a non-string"))
                })
            })
            .collect()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A session against the hybrid store under test.
///
/// Sessions are opened once per run, shared by every case, and closed by the
/// harness on every exit path.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync + std::fmt::Debug {
    /// Execute one statement and return all of its rows.
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, StoreError>;

    /// Release the session. Further `execute` calls fail with a connectivity error.
    async fn close(&self) -> Result<(), StoreError>;

    /// Endpoint description for the report header (never includes credentials).
    fn endpoint(&self) -> String;

    /// Namespace every statement is scoped to.
    fn namespace(&self) -> &str;
}

/// Open a session for the configured store URI.
///
/// `http(s)://` selects the Neo4j HTTP transaction endpoint; `sqlite://<path>`
/// and `sqlite::memory:` select the embedded reference store.
pub fn connect(section: &StoreSection) -> crate::error::Result<Box<dyn StoreClient>> {
    let uri = section.uri.trim();

    if uri == "sqlite::memory:" {
        return Ok(Box::new(SqliteStore::in_memory(&section.namespace)?));
    }
    if let Some(path) = uri.strip_prefix("sqlite://") {
        if path.is_empty() {
            return Err(ConfigError::Invalid("sqlite:// URI needs a file path".into()).into());
        }
        return Ok(Box::new(SqliteStore::open(
            std::path::Path::new(path),
            &section.namespace,
        )?));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return Ok(Box::new(Neo4jHttpStore::new(section)?));
    }
    if uri.starts_with("bolt://") || uri.starts_with("neo4j://") || uri.starts_with("neo4j+s://") {
        return Err(ConfigError::Invalid(format!(
            "bolt protocol is not supported ({uri}); use the HTTP endpoint, e.g. http://localhost:7474"
        ))
        .into());
    }
    Err(ConfigError::Invalid(format!("unsupported store URI: {uri}")).into())
}
