use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::StoreError;
use crate::types::{
    Direction, EntityId, EntityRecord, Hop, RelationKind, SimilarityFunction, cosine_similarity,
};

use super::{ENTITY_LABEL, Row, Statement, StoreClient, schema};

/// Embedded reference store backed by `SQLite`.
///
/// Implements the same statement vocabulary as the Neo4j client, with the
/// vector index emulated by an exhaustive cosine scan. Scores follow Neo4j's
/// normalisation, `(1 + cos) / 2`, so a vector scores 1.0 against itself.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Option<Connection>>,
    namespace: String,
    endpoint: String,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: &Path, namespace: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, namespace, format!("sqlite://{}", path.display()))
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(namespace: &str) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, namespace, "sqlite::memory:".to_string())
    }

    fn from_connection(
        conn: Connection,
        namespace: &str,
        endpoint: String,
    ) -> Result<Self, StoreError> {
        initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            namespace: namespace.to_string(),
            endpoint,
        })
    }
}

fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    // Ignored for in-memory databases.
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");

    conn.execute_batch(schema::SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO harness_meta (key, value) VALUES ('schema_version', ?1)",
        params![schema::SCHEMA_VERSION],
    )?;
    Ok(())
}

#[async_trait::async_trait]
impl StoreClient for SqliteStore {
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        debug!(statement = statement.name(), namespace = %self.namespace, "sqlite execute");

        let mut guard = self.conn.lock().expect("sqlite store mutex poisoned");
        let conn = guard
            .as_mut()
            .ok_or_else(|| StoreError::Connectivity("session is closed".into()))?;
        let ns = self.namespace.as_str();

        match statement {
            Statement::Ping => {
                let ok: i64 = conn.query_row("SELECT 1", [], |r| r.get(0))?;
                Ok(vec![Row::new().with("ok", ok)])
            }
            Statement::ResetNamespace => reset_namespace(conn, ns),
            Statement::DescribeIndex { name } => describe_index(conn, name),
            Statement::DropIndex { name } => {
                conn.execute("DELETE FROM vector_indexes WHERE name = ?1", params![name])?;
                Ok(Vec::new())
            }
            Statement::CreateIndex {
                name,
                dimensions,
                similarity,
            } => create_index(conn, name, *dimensions, *similarity),
            Statement::UpsertEntities { records } => upsert_entities(conn, ns, records),
            Statement::CreateRelationship {
                source,
                kind,
                target,
            } => create_relationship(conn, ns, source, *kind, target),
            Statement::CountEntities => count(conn, ns, "entities"),
            Statement::CountRelationships => count(conn, ns, "relationships"),
            Statement::VectorSearch {
                index,
                vector,
                top_k,
            } => vector_search(conn, ns, index, vector, *top_k),
            Statement::Neighbors { id } => neighbors(conn, ns, id),
            Statement::Traverse { start, hops } => traverse(conn, ns, start, hops),
            Statement::EmbeddingMismatches { dimensions } => {
                embedding_mismatches(conn, ns, *dimensions)
            }
            Statement::ListEdges => list_edges(conn, ns),
        }
    }

    async fn close(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("sqlite store mutex poisoned").take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::from(e))?;
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

fn reset_namespace(conn: &mut Connection, ns: &str) -> Result<Vec<Row>, StoreError> {
    let tx = conn.transaction()?;
    let deleted: i64 = tx.query_row(
        "SELECT COUNT(*) FROM entities WHERE namespace = ?1",
        params![ns],
        |r| r.get(0),
    )?;
    tx.execute("DELETE FROM relationships WHERE namespace = ?1", params![ns])?;
    tx.execute("DELETE FROM entities WHERE namespace = ?1", params![ns])?;
    tx.commit()?;
    Ok(vec![Row::new().with("deleted", deleted)])
}

fn describe_index(conn: &Connection, name: &str) -> Result<Vec<Row>, StoreError> {
    let row = conn
        .query_row(
            "SELECT name, state, dimensions, similarity FROM vector_indexes WHERE name = ?1",
            params![name],
            |r| {
                Ok(Row::new()
                    .with("name", r.get::<_, String>(0)?)
                    .with("state", r.get::<_, String>(1)?)
                    .with("dimensions", r.get::<_, i64>(2)?)
                    .with("similarity", r.get::<_, String>(3)?))
            },
        )
        .optional()?;
    Ok(row.into_iter().collect())
}

fn create_index(
    conn: &Connection,
    name: &str,
    dimensions: usize,
    similarity: SimilarityFunction,
) -> Result<Vec<Row>, StoreError> {
    conn.execute(
        "INSERT INTO vector_indexes (name, label, property, dimensions, similarity, state, created_at)
         VALUES (?1, ?2, 'embedding', ?3, ?4, 'ONLINE', ?5)",
        params![
            name,
            ENTITY_LABEL,
            dimensions,
            similarity.as_str(),
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(Vec::new())
}

fn upsert_entities(
    conn: &mut Connection,
    ns: &str,
    records: &[EntityRecord],
) -> Result<Vec<Row>, StoreError> {
    let tx = conn.transaction()?;
    let now = Utc::now().to_rfc3339();
    let mut rows = Vec::with_capacity(records.len());
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO entities (namespace, id, name, kind, description, embedding, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(namespace, id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                description = excluded.description,
                embedding = excluded.embedding,
                properties = excluded.properties",
        )?;
        for record in records {
            let embedding = serde_json::to_string(&record.embedding)?;
            let properties = serde_json::to_string(&record.properties)?;
            stmt.execute(params![
                ns,
                record.id.as_str(),
                record.name,
                record.kind.as_str(),
                record.description,
                embedding,
                properties,
                now,
            ])?;
            rows.push(Row::new().with("id", record.id.as_str()));
        }
    }
    tx.commit()?;
    Ok(rows)
}

fn create_relationship(
    conn: &Connection,
    ns: &str,
    source: &EntityId,
    kind: RelationKind,
    target: &EntityId,
) -> Result<Vec<Row>, StoreError> {
    conn.execute(
        "INSERT INTO relationships (namespace, source, kind, target)
         SELECT ?1, ?2, ?3, ?4
         WHERE NOT EXISTS (
               SELECT 1 FROM relationships
               WHERE namespace = ?1 AND source = ?2 AND kind = ?3 AND target = ?4
           )",
        params![ns, source.as_str(), kind.as_str(), target.as_str()],
    )?;
    let created: i64 = conn.query_row(
        "SELECT COUNT(*) FROM relationships
         WHERE namespace = ?1 AND source = ?2 AND kind = ?3 AND target = ?4",
        params![ns, source.as_str(), kind.as_str(), target.as_str()],
        |r| r.get(0),
    )?;
    Ok(vec![Row::new().with("created", created)])
}

fn count(conn: &Connection, ns: &str, table: &str) -> Result<Vec<Row>, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE namespace = ?1");
    let n: i64 = conn.query_row(&sql, params![ns], |r| r.get(0))?;
    Ok(vec![Row::new().with("count", n)])
}

fn vector_search(
    conn: &Connection,
    ns: &str,
    index: &str,
    vector: &[f32],
    top_k: usize,
) -> Result<Vec<Row>, StoreError> {
    let dimensions: Option<i64> = conn
        .query_row(
            "SELECT dimensions FROM vector_indexes WHERE name = ?1",
            params![index],
            |r| r.get(0),
        )
        .optional()?;
    let Some(dimensions) = dimensions else {
        return Err(StoreError::statement(
            "INDEX_NOT_FOUND",
            format!("no vector index named `{index}`"),
        ));
    };
    let dimensions = usize::try_from(dimensions).unwrap_or_default();
    if vector.len() != dimensions {
        return Err(StoreError::statement(
            "VECTOR_DIMENSION_MISMATCH",
            format!(
                "query vector has {} dimensions, index `{index}` expects {dimensions}",
                vector.len()
            ),
        ));
    }

    let mut stmt = conn.prepare_cached(
        "SELECT id, name, kind, embedding FROM entities
         WHERE namespace = ?1 AND embedding IS NOT NULL",
    )?;
    let candidates = stmt
        .query_map(params![ns], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut scored = Vec::with_capacity(candidates.len());
    for (id, name, kind, raw) in candidates {
        let embedding: Vec<f32> = serde_json::from_str(&raw)?;
        // Nodes with a foreign dimensionality are not part of the index.
        if embedding.len() != dimensions {
            continue;
        }
        let score = (1.0 + cosine_similarity(vector, &embedding)) / 2.0;
        scored.push((score, id, name, kind));
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.truncate(top_k);

    Ok(scored
        .into_iter()
        .map(|(score, id, name, kind)| {
            Row::new()
                .with("id", id)
                .with("name", name)
                .with("kind", kind)
                .with("score", score)
        })
        .collect())
}

fn neighbors(conn: &Connection, ns: &str, id: &EntityId) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT 'out' AS direction, kind, target AS id FROM relationships
             WHERE namespace = ?1 AND source = ?2
         UNION ALL
         SELECT 'in' AS direction, kind, source AS id FROM relationships
             WHERE namespace = ?1 AND target = ?2
         ORDER BY direction, kind, id",
    )?;
    let rows = stmt
        .query_map(params![ns, id.as_str()], |r| {
            Ok(Row::new()
                .with("direction", r.get::<_, String>(0)?)
                .with("kind", r.get::<_, String>(1)?)
                .with("id", r.get::<_, String>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

fn traverse(
    conn: &Connection,
    ns: &str,
    start: &EntityId,
    hops: &[Hop],
) -> Result<Vec<Row>, StoreError> {
    let mut frontier = BTreeSet::from([start.as_str().to_string()]);
    for hop in hops {
        let sql = match hop.direction {
            Direction::Out => {
                "SELECT target FROM relationships WHERE namespace = ?1 AND kind = ?2 AND source = ?3"
            }
            Direction::In => {
                "SELECT source FROM relationships WHERE namespace = ?1 AND kind = ?2 AND target = ?3"
            }
        };
        let mut stmt = conn.prepare_cached(sql)?;
        let mut next = BTreeSet::new();
        for node in &frontier {
            let reached = stmt
                .query_map(params![ns, hop.kind.as_str(), node], |r| {
                    r.get::<_, String>(0)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            next.extend(reached);
        }
        frontier = next;
    }
    Ok(frontier
        .into_iter()
        .map(|id| Row::new().with("id", id))
        .collect())
}

fn embedding_mismatches(
    conn: &Connection,
    ns: &str,
    dimensions: usize,
) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM entities
         WHERE namespace = ?1
           AND (embedding IS NULL OR json_array_length(embedding) <> ?2)
         ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![ns, dimensions], |r| r.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(vec![
        Row::new()
            .with("mismatches", ids.len())
            .with("ids", ids),
    ])
}

fn list_edges(conn: &Connection, ns: &str) -> Result<Vec<Row>, StoreError> {
    let mut stmt = conn.prepare_cached(
        "SELECT source, kind, target FROM relationships
         WHERE namespace = ?1
         ORDER BY source, kind, target",
    )?;
    let rows = stmt
        .query_map(params![ns], |r| {
            Ok(Row::new()
                .with("source", r.get::<_, String>(0)?)
                .with("kind", r.get::<_, String>(1)?)
                .with("target", r.get::<_, String>(2)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::StoreErrorKind;
    use crate::types::EntityKind;

    fn record(id: &str, embedding: Vec<f32>) -> EntityRecord {
        EntityRecord {
            id: EntityId::new(id),
            name: id.to_uppercase(),
            kind: EntityKind::Topic,
            description: format!("about {id}"),
            embedding,
            properties: BTreeMap::new(),
        }
    }

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory("test").unwrap();
        store
            .execute(&Statement::CreateIndex {
                name: "idx".into(),
                dimensions: 3,
                similarity: SimilarityFunction::Cosine,
            })
            .await
            .unwrap();
        store
            .execute(&Statement::UpsertEntities {
                records: vec![
                    record("a", vec![1.0, 0.0, 0.0]),
                    record("b", vec![0.0, 1.0, 0.0]),
                    record("c", vec![0.9, 0.1, 0.0]),
                ],
            })
            .await
            .unwrap();
        for (s, t) in [("a", "b"), ("b", "c")] {
            store
                .execute(&Statement::CreateRelationship {
                    source: s.into(),
                    kind: RelationKind::Cites,
                    target: t.into(),
                })
                .await
                .unwrap();
        }
        store
    }

    async fn single_u64(store: &SqliteStore, statement: Statement, column: &str) -> u64 {
        let rows = store.execute(&statement).await.unwrap();
        rows[0].get_u64(column).unwrap()
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = seeded().await;
        store
            .execute(&Statement::UpsertEntities {
                records: vec![record("a", vec![1.0, 0.0, 0.0])],
            })
            .await
            .unwrap();
        assert_eq!(single_u64(&store, Statement::CountEntities, "count").await, 3);
        assert_eq!(
            single_u64(&store, Statement::CountRelationships, "count").await,
            2
        );
    }

    #[tokio::test]
    async fn relationship_to_missing_entity_violates_foreign_key() {
        let store = seeded().await;
        let err = store
            .execute(&Statement::CreateRelationship {
                source: "a".into(),
                kind: RelationKind::Cites,
                target: "ghost".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Statement { ref code, .. } if code.starts_with("SQLITE_")));
    }

    #[tokio::test]
    async fn vector_search_ranks_self_first() {
        let store = seeded().await;
        let rows = store
            .execute(&Statement::VectorSearch {
                index: "idx".into(),
                vector: vec![1.0, 0.0, 0.0],
                top_k: 2,
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("id").unwrap(), "a");
        assert!((rows[0].get_f64("score").unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(rows[1].get_str("id").unwrap(), "c");
    }

    #[tokio::test]
    async fn vector_search_without_index_is_a_statement_error() {
        let store = SqliteStore::in_memory("test").unwrap();
        let err = store
            .execute(&Statement::VectorSearch {
                index: "missing".into(),
                vector: vec![1.0],
                top_k: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Statement);
    }

    #[tokio::test]
    async fn neighbors_and_traverse_follow_direction() {
        let store = seeded().await;
        let rows = store
            .execute(&Statement::Neighbors { id: "b".into() })
            .await
            .unwrap();
        let seen: Vec<(String, String)> = rows
            .iter()
            .map(|r| {
                (
                    r.get_str("direction").unwrap().to_string(),
                    r.get_str("id").unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            seen,
            vec![("in".into(), "a".into()), ("out".into(), "c".into())]
        );

        let rows = store
            .execute(&Statement::Traverse {
                start: "a".into(),
                hops: vec![Hop::out(RelationKind::Cites), Hop::out(RelationKind::Cites)],
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_str("id").unwrap(), "c");

        let rows = store
            .execute(&Statement::Traverse {
                start: "a".into(),
                hops: vec![Hop::inbound(RelationKind::Cites)],
            })
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn embedding_mismatches_lists_offenders() {
        let store = seeded().await;
        store
            .execute(&Statement::UpsertEntities {
                records: vec![record("short", vec![1.0])],
            })
            .await
            .unwrap();
        let rows = store
            .execute(&Statement::EmbeddingMismatches { dimensions: 3 })
            .await
            .unwrap();
        assert_eq!(rows[0].get_u64("mismatches").unwrap(), 1);
        assert_eq!(rows[0].get_str_list("ids").unwrap(), vec!["short"]);
    }

    #[tokio::test]
    async fn reset_only_touches_own_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let first = SqliteStore::open(&path, "one").unwrap();
        let second = SqliteStore::open(&path, "two").unwrap();
        for store in [&first, &second] {
            store
                .execute(&Statement::UpsertEntities {
                    records: vec![record("a", vec![1.0])],
                })
                .await
                .unwrap();
        }

        let deleted = single_u64(&first, Statement::ResetNamespace, "deleted").await;
        assert_eq!(deleted, 1);
        assert_eq!(single_u64(&first, Statement::CountEntities, "count").await, 0);
        assert_eq!(single_u64(&second, Statement::CountEntities, "count").await, 1);
    }

    #[tokio::test]
    async fn describe_and_drop_index() {
        let store = seeded().await;
        let rows = store
            .execute(&Statement::DescribeIndex { name: "idx".into() })
            .await
            .unwrap();
        assert_eq!(rows[0].get_u64("dimensions").unwrap(), 3);
        assert_eq!(rows[0].get_str("state").unwrap(), "ONLINE");

        store
            .execute(&Statement::DropIndex { name: "idx".into() })
            .await
            .unwrap();
        let rows = store
            .execute(&Statement::DescribeIndex { name: "idx".into() })
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn closed_session_rejects_statements() {
        let store = SqliteStore::in_memory("test").unwrap();
        store.close().await.unwrap();
        let err = store.execute(&Statement::Ping).await.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Connectivity);
        // closing twice is harmless
        store.close().await.unwrap();
    }
}
