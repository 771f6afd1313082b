// Typed statement helpers that decode store rows into domain values.
//
// Shared by the schema engine, the ingestion loaders, the consistency checker,
// and the verification cases.

use crate::error::StoreError;
use crate::store::{Row, Statement, StoreClient};
use crate::types::{
    Direction, EdgeTuple, EntityId, EntityKind, EntityRecord, Hop, IndexInfo, Neighbor,
    RelationKind, SearchHit, SimilarityFunction,
};

/// Run a statement expected to return exactly one row.
async fn single(store: &dyn StoreClient, statement: &Statement) -> Result<Row, StoreError> {
    store
        .execute(statement)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Decode(format!("{} returned no rows", statement.name())))
}

fn relation_kind(row: &Row, column: &str) -> Result<RelationKind, StoreError> {
    let raw = row.get_str(column)?;
    RelationKind::parse(raw)
        .ok_or_else(|| StoreError::Decode(format!("unknown relationship type `{raw}`")))
}

fn entity_kind(row: &Row, column: &str) -> Result<EntityKind, StoreError> {
    let raw = row.get_str(column)?;
    EntityKind::parse(raw).ok_or_else(|| StoreError::Decode(format!("unknown entity kind `{raw}`")))
}

/// Round-trip a trivial statement; succeeds only if the session is usable.
pub async fn ping(store: &dyn StoreClient) -> Result<(), StoreError> {
    let row = single(store, &Statement::Ping).await?;
    match row.get_u64("ok")? {
        1 => Ok(()),
        other => Err(StoreError::Decode(format!("ping returned {other}"))),
    }
}

/// Delete everything in the session namespace. Returns the number of entities removed.
pub async fn reset_namespace(store: &dyn StoreClient) -> Result<u64, StoreError> {
    single(store, &Statement::ResetNamespace)
        .await?
        .get_u64("deleted")
}

pub async fn describe_index(
    store: &dyn StoreClient,
    name: &str,
) -> Result<Option<IndexInfo>, StoreError> {
    let rows = store
        .execute(&Statement::DescribeIndex {
            name: name.to_string(),
        })
        .await?;
    let Some(row) = rows.into_iter().next() else {
        return Ok(None);
    };
    let dimensions = usize::try_from(row.get_u64("dimensions")?)
        .map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(Some(IndexInfo {
        name: row.get_str("name")?.to_string(),
        dimensions,
        similarity: row
            .get("similarity")
            .ok()
            .and_then(|v| v.as_str())
            .and_then(SimilarityFunction::parse),
        state: row.get_str("state")?.to_string(),
    }))
}

pub async fn drop_index(store: &dyn StoreClient, name: &str) -> Result<(), StoreError> {
    store
        .execute(&Statement::DropIndex {
            name: name.to_string(),
        })
        .await?;
    Ok(())
}

pub async fn create_index(
    store: &dyn StoreClient,
    name: &str,
    dimensions: usize,
    similarity: SimilarityFunction,
) -> Result<(), StoreError> {
    store
        .execute(&Statement::CreateIndex {
            name: name.to_string(),
            dimensions,
            similarity,
        })
        .await?;
    Ok(())
}

/// Write a batch of entities. Returns the ids the store acknowledged.
pub async fn upsert_entities(
    store: &dyn StoreClient,
    records: Vec<EntityRecord>,
) -> Result<Vec<EntityId>, StoreError> {
    let rows = store
        .execute(&Statement::UpsertEntities { records })
        .await?;
    rows.iter()
        .map(|row| row.get_str("id").map(EntityId::new))
        .collect()
}

/// Write one edge. Returns how many matching edges exist afterwards.
pub async fn create_relationship(
    store: &dyn StoreClient,
    edge: &EdgeTuple,
) -> Result<u64, StoreError> {
    single(
        store,
        &Statement::CreateRelationship {
            source: edge.source.clone(),
            kind: edge.kind,
            target: edge.target.clone(),
        },
    )
    .await?
    .get_u64("created")
}

pub async fn count_entities(store: &dyn StoreClient) -> Result<u64, StoreError> {
    single(store, &Statement::CountEntities)
        .await?
        .get_u64("count")
}

pub async fn count_relationships(store: &dyn StoreClient) -> Result<u64, StoreError> {
    single(store, &Statement::CountRelationships)
        .await?
        .get_u64("count")
}

/// Top-`k` entities by vector similarity, best first.
pub async fn vector_search(
    store: &dyn StoreClient,
    index: &str,
    vector: &[f32],
    top_k: usize,
) -> Result<Vec<SearchHit>, StoreError> {
    let rows = store
        .execute(&Statement::VectorSearch {
            index: index.to_string(),
            vector: vector.to_vec(),
            top_k,
        })
        .await?;
    rows.iter()
        .map(|row| {
            Ok(SearchHit {
                id: EntityId::new(row.get_str("id")?),
                name: row.get_str("name")?.to_string(),
                kind: entity_kind(row, "kind")?,
                score: row.get_f64("score")?,
            })
        })
        .collect()
}

/// All neighbours of `id`, both directions.
pub async fn neighbors(
    store: &dyn StoreClient,
    id: &EntityId,
) -> Result<Vec<Neighbor>, StoreError> {
    let rows = store
        .execute(&Statement::Neighbors { id: id.clone() })
        .await?;
    rows.iter()
        .map(|row| {
            let raw = row.get_str("direction")?;
            let direction = Direction::parse(raw)
                .ok_or_else(|| StoreError::Decode(format!("unknown direction `{raw}`")))?;
            Ok(Neighbor {
                direction,
                kind: relation_kind(row, "kind")?,
                id: EntityId::new(row.get_str("id")?),
            })
        })
        .collect()
}

/// Entities reachable from `start` along exactly `hops`.
pub async fn traverse(
    store: &dyn StoreClient,
    start: &EntityId,
    hops: &[Hop],
) -> Result<Vec<EntityId>, StoreError> {
    let rows = store
        .execute(&Statement::Traverse {
            start: start.clone(),
            hops: hops.to_vec(),
        })
        .await?;
    rows.iter()
        .map(|row| row.get_str("id").map(EntityId::new))
        .collect()
}

/// Count and ids of entities whose embedding is missing or the wrong length.
pub async fn embedding_mismatches(
    store: &dyn StoreClient,
    dimensions: usize,
) -> Result<(u64, Vec<EntityId>), StoreError> {
    let row = single(store, &Statement::EmbeddingMismatches { dimensions }).await?;
    let ids = row
        .get_str_list("ids")?
        .into_iter()
        .map(EntityId)
        .collect();
    Ok((row.get_u64("mismatches")?, ids))
}

/// Every stored edge in the namespace as (source, kind, target).
pub async fn list_edges(store: &dyn StoreClient) -> Result<Vec<EdgeTuple>, StoreError> {
    let rows = store.execute(&Statement::ListEdges).await?;
    rows.iter()
        .map(|row| {
            Ok(EdgeTuple {
                source: EntityId::new(row.get_str("source")?),
                kind: relation_kind(row, "kind")?,
                target: EntityId::new(row.get_str("target")?),
            })
        })
        .collect()
}
