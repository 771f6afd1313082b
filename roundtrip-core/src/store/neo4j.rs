// Neo4j client over the HTTP transactional endpoint (`/db/{database}/tx/commit`).
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::StoreSection;
use crate::error::StoreError;
use crate::fixture::MAX_TRAVERSAL_HOPS;
use crate::types::RelationKind;

use super::{Row, Statement, StoreClient};

/// Candidates fetched from the shared vector index per requested hit, so other
/// namespaces' nodes cannot crowd this namespace out of the top results.
const VECTOR_SEARCH_FANOUT: usize = 16;

/// Neo4j session speaking the HTTP transaction API with basic auth.
///
/// Every statement is sent as its own auto-commit transaction.
pub struct Neo4jHttpStore {
    client: Client,
    commit_url: String,
    base_uri: String,
    database: String,
    username: String,
    password: String,
    namespace: String,
    closed: AtomicBool,
}

impl std::fmt::Debug for Neo4jHttpStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jHttpStore")
            .field("commit_url", &self.commit_url)
            .field("username", &self.username)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl Neo4jHttpStore {
    pub fn new(section: &StoreSection) -> Result<Self, StoreError> {
        // reqwest is built without a default rustls provider.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let client = Client::builder()
            .timeout(Duration::from_secs(section.request_timeout_secs))
            .build()
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;
        let base_uri = section.uri.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            commit_url: format!("{base_uri}/db/{}/tx/commit", section.database),
            base_uri,
            database: section.database.clone(),
            username: section.username.clone(),
            password: section.password.clone(),
            namespace: section.namespace.clone(),
            closed: AtomicBool::new(false),
        })
    }

    /// Translate a statement into Cypher text plus its parameter map.
    fn cypher(&self, statement: &Statement) -> Result<(String, Map<String, Value>), StoreError> {
        let mut params = Map::new();
        params.insert("namespace".into(), json!(self.namespace));

        let text = match statement {
            Statement::Ping => "RETURN 1 AS ok".to_string(),
            Statement::ResetNamespace => "MATCH (n:HarnessEntity {namespace: $namespace}) \
                 DETACH DELETE n \
                 RETURN count(n) AS deleted"
                .to_string(),
            Statement::DescribeIndex { name } => {
                params.insert("name".into(), json!(name));
                "SHOW INDEXES YIELD name, type, state, options \
                 WHERE name = $name AND type = 'VECTOR' \
                 RETURN name, state, \
                        options.indexConfig['vector.dimensions'] AS dimensions, \
                        options.indexConfig['vector.similarity_function'] AS similarity"
                    .to_string()
            }
            Statement::DropIndex { name } => {
                format!("DROP INDEX `{}` IF EXISTS", index_identifier(name)?)
            }
            Statement::CreateIndex {
                name,
                dimensions,
                similarity,
            } => {
                params.insert("name".into(), json!(name));
                params.insert("dimensions".into(), json!(dimensions));
                params.insert("similarity".into(), json!(similarity.as_str()));
                "CALL db.index.vector.createNodeIndex(\
                 $name, 'HarnessEntity', 'embedding', $dimensions, $similarity)"
                    .to_string()
            }
            Statement::UpsertEntities { records } => {
                params.insert("entities".into(), serde_json::to_value(records)?);
                "UNWIND $entities AS e \
                 MERGE (n:HarnessEntity {namespace: $namespace, id: e.id}) \
                 SET n += e.properties \
                 SET n.name = e.name, n.kind = e.kind, n.description = e.description, \
                     n.embedding = e.embedding, n.created_at = datetime() \
                 RETURN n.id AS id"
                    .to_string()
            }
            Statement::CreateRelationship {
                source,
                kind,
                target,
            } => {
                params.insert("source".into(), json!(source));
                params.insert("target".into(), json!(target));
                merge_edge_cypher(*kind).to_string()
            }
            Statement::CountEntities => "MATCH (n:HarnessEntity {namespace: $namespace}) \
                 RETURN count(n) AS count"
                .to_string(),
            Statement::CountRelationships => {
                "MATCH (:HarnessEntity {namespace: $namespace})-[r]->(:HarnessEntity {namespace: $namespace}) \
                 RETURN count(r) AS count"
                    .to_string()
            }
            Statement::VectorSearch {
                index,
                vector,
                top_k,
            } => {
                params.insert("index".into(), json!(index));
                params.insert("top_k".into(), json!(top_k));
                params.insert(
                    "candidates".into(),
                    json!(top_k.saturating_mul(VECTOR_SEARCH_FANOUT)),
                );
                params.insert("vector".into(), json!(vector));
                // The index spans every namespace; cut to top_k only after filtering.
                "CALL db.index.vector.queryNodes($index, $candidates, $vector) YIELD node, score \
                 WHERE node.namespace = $namespace \
                 RETURN node.id AS id, node.name AS name, node.kind AS kind, score \
                 ORDER BY score DESC, id \
                 LIMIT $top_k"
                    .to_string()
            }
            Statement::Neighbors { id } => {
                params.insert("id".into(), json!(id));
                "MATCH (s:HarnessEntity {namespace: $namespace, id: $id})-[r]-(o:HarnessEntity {namespace: $namespace}) \
                 RETURN CASE WHEN startNode(r) = s THEN 'out' ELSE 'in' END AS direction, \
                        type(r) AS kind, o.id AS id \
                 ORDER BY direction, kind, id"
                    .to_string()
            }
            Statement::Traverse { start, hops } => {
                params.insert("start".into(), json!(start));
                params.insert("hops".into(), serde_json::to_value(hops)?);
                format!(
                    "MATCH p = (s:HarnessEntity {{namespace: $namespace, id: $start}})-[*1..{MAX_TRAVERSAL_HOPS}]-(t:HarnessEntity) \
                     WHERE length(p) = size($hops) \
                       AND all(n IN nodes(p) WHERE n.namespace = $namespace) \
                       AND all(i IN range(0, size($hops) - 1) WHERE \
                           type(relationships(p)[i]) = $hops[i].kind \
                           AND (startNode(relationships(p)[i]) = nodes(p)[i]) = ($hops[i].direction = 'out')) \
                     RETURN DISTINCT t.id AS id \
                     ORDER BY id"
                )
            }
            Statement::EmbeddingMismatches { dimensions } => {
                params.insert("dimensions".into(), json!(dimensions));
                "MATCH (n:HarnessEntity {namespace: $namespace}) \
                 WHERE n.embedding IS NULL OR size(n.embedding) <> $dimensions \
                 WITH n ORDER BY n.id \
                 RETURN count(n) AS mismatches, collect(n.id) AS ids"
                    .to_string()
            }
            Statement::ListEdges => {
                "MATCH (s:HarnessEntity {namespace: $namespace})-[r]->(t:HarnessEntity {namespace: $namespace}) \
                 RETURN s.id AS source, type(r) AS kind, t.id AS target \
                 ORDER BY source, kind, target"
                    .to_string()
            }
        };
        Ok((text, params))
    }
}

/// Relationship types cannot be parameterised in Cypher, so each kind gets its
/// own statement text.
macro_rules! merge_edge {
    ($kind:literal) => {
        concat!(
            "MATCH (s:HarnessEntity {namespace: $namespace, id: $source}) ",
            "MATCH (t:HarnessEntity {namespace: $namespace, id: $target}) ",
            "MERGE (s)-[r:",
            $kind,
            "]->(t) RETURN count(r) AS created"
        )
    };
}

fn merge_edge_cypher(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::AuthoredBy => merge_edge!("AUTHORED_BY"),
        RelationKind::TreatedBy => merge_edge!("TREATED_BY"),
        RelationKind::Discusses => merge_edge!("DISCUSSES"),
        RelationKind::WorksIn => merge_edge!("WORKS_IN"),
        RelationKind::CollaboratesWith => merge_edge!("COLLABORATES_WITH"),
        RelationKind::ManifestsAs => merge_edge!("MANIFESTS_AS"),
        RelationKind::Prescribes => merge_edge!("PRESCRIBES"),
        RelationKind::Diagnoses => merge_edge!("DIAGNOSES"),
        RelationKind::Cites => merge_edge!("CITES"),
    }
}

/// Index names are interpolated into DDL; only plain identifiers are accepted.
fn index_identifier(name: &str) -> Result<&str, StoreError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(StoreError::statement(
            "INVALID_INDEX_NAME",
            format!("index name `{name}` is not a plain identifier"),
        ))
    }
}

#[derive(Serialize)]
struct TxRequest<'a> {
    statements: [TxStatement<'a>; 1],
}

#[derive(Serialize)]
struct TxStatement<'a> {
    statement: &'a str,
    parameters: &'a Map<String, Value>,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    columns: Vec<String>,
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Classify a transport-level failure.
fn classify_status(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::Auth(body),
        s if s.is_server_error() => StoreError::Connectivity(format!("HTTP {}: {body}", s.as_u16())),
        s => StoreError::statement(format!("HTTP_{}", s.as_u16()), body),
    }
}

/// Classify the first error a transaction reported.
fn classify_tx_error(error: TxError) -> StoreError {
    if error.code.starts_with("Neo.ClientError.Security.") {
        StoreError::Auth(format!("{}: {}", error.code, error.message))
    } else {
        StoreError::statement(error.code, error.message)
    }
}

/// Turn a transaction response into rows keyed by column name.
fn decode_response(response: TxResponse) -> Result<Vec<Row>, StoreError> {
    if let Some(error) = response.errors.into_iter().next() {
        return Err(classify_tx_error(error));
    }
    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };
    result
        .data
        .into_iter()
        .map(|data| {
            if data.row.len() != result.columns.len() {
                return Err(StoreError::Decode(format!(
                    "row has {} values for {} columns",
                    data.row.len(),
                    result.columns.len()
                )));
            }
            Ok(Row::from(
                result
                    .columns
                    .iter()
                    .cloned()
                    .zip(data.row)
                    .collect::<Map<String, Value>>(),
            ))
        })
        .collect()
}

#[async_trait::async_trait]
impl StoreClient for Neo4jHttpStore {
    async fn execute(&self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connectivity("session is closed".into()));
        }

        let (text, parameters) = self.cypher(statement)?;
        let body = TxRequest {
            statements: [TxStatement {
                statement: &text,
                parameters: &parameters,
            }],
        };

        debug!(statement = statement.name(), url = %self.commit_url, "neo4j execute");

        let resp = self
            .client
            .post(&self.commit_url)
            .basic_auth(&self.username, Some(&self.password))
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, text));
        }

        let response: TxResponse = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        decode_response(response)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{} (database {})", self.base_uri, self.database)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
