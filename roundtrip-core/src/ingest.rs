// Schema management and fixture ingestion.
//
// The schema engine owns namespace reset and the vector index lifecycle; the
// loaders write entities (with embeddings) and then relationships, aborting at
// the first failing item with its catalog index.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use crate::config::{EmbeddingSection, MismatchPolicy, SchemaSection};
use crate::embed::Embedder;
use crate::error::{
    CaseError, ConfigError, HarnessError, IngestPhase, IngestionError, StoreError, StoreErrorKind,
};
use crate::fixture::FixtureCatalog;
use crate::query;
use crate::store::StoreClient;
use crate::types::{Entity, EntityRecord, IndexInfo, SimilarityFunction};

/// What [`SchemaEngine::ensure_index`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    Created,
    Unchanged,
    Recreated,
}

impl std::fmt::Display for IndexAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Unchanged => "unchanged",
            Self::Recreated => "recreated",
        })
    }
}

/// Namespace reset plus vector index setup for one run.
#[derive(Debug)]
pub struct SchemaEngine<'a> {
    store: &'a dyn StoreClient,
    schema: &'a SchemaSection,
    dimensions: usize,
    similarity: SimilarityFunction,
}

impl<'a> SchemaEngine<'a> {
    pub fn new(
        store: &'a dyn StoreClient,
        schema: &'a SchemaSection,
        embedding: &EmbeddingSection,
    ) -> Self {
        Self {
            store,
            schema,
            dimensions: embedding.dimensions,
            similarity: embedding.similarity,
        }
    }

    /// The embedder must produce vectors of the run's pinned length.
    pub fn check_embedder(&self, embedder: &dyn Embedder) -> crate::error::Result<()> {
        if embedder.dimensions() == self.dimensions {
            Ok(())
        } else {
            Err(ConfigError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedder.dimensions(),
                context: format!("embedder `{}`", embedder.name()),
            }
            .into())
        }
    }

    /// Remove every entity and edge in the session namespace.
    pub async fn reset(&self) -> crate::error::Result<u64> {
        let deleted = query::reset_namespace(self.store).await?;
        info!(namespace = self.store.namespace(), deleted, "Namespace reset");
        Ok(deleted)
    }

    /// Make sure a vector index with the pinned dimensionality exists and is ONLINE.
    #[instrument(skip_all, fields(index = %self.schema.index_name))]
    pub async fn ensure_index(&self) -> crate::error::Result<IndexAction> {
        let name = &self.schema.index_name;
        let action = match query::describe_index(self.store, name).await? {
            None => {
                query::create_index(self.store, name, self.dimensions, self.similarity).await?;
                IndexAction::Created
            }
            Some(info) if self.compatible(&info) => IndexAction::Unchanged,
            Some(info) => match self.schema.on_dimension_mismatch {
                MismatchPolicy::Fail => return Err(self.incompatible(&info).into()),
                MismatchPolicy::Recreate => {
                    warn!(
                        existing = info.dimensions,
                        pinned = self.dimensions,
                        "Recreating incompatible vector index"
                    );
                    query::drop_index(self.store, name).await?;
                    query::create_index(self.store, name, self.dimensions, self.similarity)
                        .await?;
                    IndexAction::Recreated
                }
            },
        };

        let info = self.wait_online().await?;
        info!(
            action = %action,
            dimensions = info.dimensions,
            state = %info.state,
            "Vector index ready"
        );
        Ok(action)
    }

    fn compatible(&self, info: &IndexInfo) -> bool {
        info.dimensions == self.dimensions && info.similarity == Some(self.similarity)
    }

    fn incompatible(&self, info: &IndexInfo) -> ConfigError {
        if info.dimensions == self.dimensions {
            ConfigError::Invalid(format!(
                "vector index `{}` does not use {} similarity",
                info.name, self.similarity
            ))
        } else {
            ConfigError::DimensionMismatch {
                expected: self.dimensions,
                actual: info.dimensions,
                context: format!("vector index `{}`", info.name),
            }
        }
    }

    /// Poll the index until it reports ONLINE or the timeout elapses.
    async fn wait_online(&self) -> crate::error::Result<IndexInfo> {
        let timeout = Duration::from_secs(self.schema.index_online_timeout_secs);
        let interval = Duration::from_millis(self.schema.index_poll_interval_ms);
        let started = Instant::now();
        loop {
            match query::describe_index(self.store, &self.schema.index_name).await? {
                Some(info) if info.is_online() => return Ok(info),
                Some(info) => {
                    tracing::debug!(state = %info.state, "Waiting for vector index");
                }
                None => {}
            }
            if started.elapsed() >= timeout {
                return Err(CaseError::Timeout {
                    seconds: self.schema.index_online_timeout_secs,
                }
                .into());
            }
            tokio::time::sleep(interval).await;
        }
    }
}

/// Counts written by a full ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub entities: usize,
    pub relationships: usize,
}

/// Connectivity and auth failures stay fatal; everything else aborts the load.
fn abort(phase: IngestPhase, index: usize, key: &str, err: StoreError) -> HarnessError {
    match err.kind() {
        StoreErrorKind::Connectivity | StoreErrorKind::Auth => err.into(),
        StoreErrorKind::Statement => IngestionError {
            phase,
            index,
            key: key.to_string(),
            reason: err.to_string(),
        }
        .into(),
    }
}

/// Embed and write entities in catalog order, `batch_size` per statement.
///
/// A failing batch is reported at its first index; a failing embedding at the
/// exact entity.
#[instrument(skip_all, fields(count = entities.len(), batch_size = batch_size))]
pub async fn load_entities(
    store: &dyn StoreClient,
    embedder: &dyn Embedder,
    entities: &[Entity],
    batch_size: usize,
) -> crate::error::Result<usize> {
    let mut written = 0;
    for (batch_no, batch) in entities.chunks(batch_size.max(1)).enumerate() {
        let offset = batch_no * batch_size.max(1);

        let mut records = Vec::with_capacity(batch.len());
        for (i, entity) in batch.iter().enumerate() {
            let embedding = embedder.embed(&entity.description).await.map_err(|e| {
                if e.is_fatal() {
                    e
                } else {
                    IngestionError {
                        phase: IngestPhase::Entities,
                        index: offset + i,
                        key: entity.id.to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                }
            })?;
            records.push(EntityRecord::from_entity(entity, embedding));
        }

        let acknowledged = query::upsert_entities(store, records)
            .await
            .map_err(|e| abort(IngestPhase::Entities, offset, batch[0].id.as_str(), e))?;
        if acknowledged.len() != batch.len() {
            let missing = &batch[acknowledged.len().min(batch.len() - 1)];
            return Err(IngestionError {
                phase: IngestPhase::Entities,
                index: offset + acknowledged.len().min(batch.len() - 1),
                key: missing.id.to_string(),
                reason: format!(
                    "store acknowledged {} of {} entities",
                    acknowledged.len(),
                    batch.len()
                ),
            }
            .into());
        }
        written += batch.len();
    }
    info!(written, "Entities loaded");
    Ok(written)
}

/// Write relationships in catalog order, one statement per edge.
#[instrument(skip_all, fields(count = catalog.relationships().len()))]
pub async fn load_relationships(
    store: &dyn StoreClient,
    catalog: &FixtureCatalog,
) -> crate::error::Result<usize> {
    for (index, rel) in catalog.relationships().iter().enumerate() {
        let tuple = rel.tuple();
        let key = tuple.to_string();
        let created = query::create_relationship(store, &tuple)
            .await
            .map_err(|e| abort(IngestPhase::Relationships, index, &key, e))?;
        if created == 0 {
            return Err(IngestionError {
                phase: IngestPhase::Relationships,
                index,
                key,
                reason: "endpoint entity not found in store".into(),
            }
            .into());
        }
    }
    let written = catalog.relationships().len();
    info!(written, "Relationships loaded");
    Ok(written)
}

/// Entities first, then relationships.
pub async fn ingest(
    store: &dyn StoreClient,
    embedder: &dyn Embedder,
    catalog: &FixtureCatalog,
    batch_size: usize,
) -> crate::error::Result<IngestSummary> {
    let entities = load_entities(store, embedder, catalog.entities(), batch_size).await?;
    let relationships = load_relationships(store, catalog).await?;
    Ok(IngestSummary {
        entities,
        relationships,
    })
}
