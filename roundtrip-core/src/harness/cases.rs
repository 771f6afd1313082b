// The six standard verification cases, in execution order.

use std::collections::BTreeSet;
use std::fmt::Display;

use crate::consistency;
use crate::error::{CaseError, FixtureError};
use crate::ingest::{self, SchemaEngine};
use crate::query;
use crate::types::EntityId;

use super::{CaseContext, TestCase};

/// Connectivity, Initialization, Ingestion, Hybrid Search, Multi-hop
/// Traversal, Consistency.
pub fn standard_cases() -> Vec<Box<dyn TestCase>> {
    vec![
        Box::new(Connectivity),
        Box::new(Initialization),
        Box::new(Ingestion),
        Box::new(HybridSearch),
        Box::new(MultiHopTraversal),
        Box::new(Consistency),
    ]
}

fn format_set<T: Display>(items: &BTreeSet<T>) -> String {
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("{{{}}}", parts.join(", "))
}

fn probe_entity<'a>(
    ctx: &CaseContext<'a>,
    id: &EntityId,
) -> crate::error::Result<&'a crate::types::Entity> {
    ctx.catalog
        .entity(id)
        .ok_or_else(|| FixtureError::UnknownProbe(id.to_string()).into())
}

/// A trivial read round-trips through the store.
#[derive(Debug)]
pub struct Connectivity;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl TestCase for Connectivity {
    fn name(&self) -> &str {
        "Connectivity"
    }

    fn description(&self) -> &str {
        "store answers a trivial read"
    }

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String> {
        query::ping(ctx.store).await?;
        Ok(format!("{} answered", ctx.store.endpoint()))
    }
}

/// Reset the namespace and provision the vector index.
#[derive(Debug)]
pub struct Initialization;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl TestCase for Initialization {
    fn name(&self) -> &str {
        "Initialization"
    }

    fn description(&self) -> &str {
        "namespace reset and vector index online with pinned dimensions"
    }

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String> {
        let schema = &ctx.config.schema;
        let dimensions = ctx.config.embedding.dimensions;
        let engine = SchemaEngine::new(ctx.store, schema, &ctx.config.embedding);

        engine.check_embedder(ctx.embedder)?;
        let deleted = engine.reset().await?;
        let action = engine.ensure_index().await?;

        let info = query::describe_index(ctx.store, &schema.index_name)
            .await?
            .ok_or_else(|| CaseError::mismatch("vector index", &schema.index_name, "absent"))?;
        if info.dimensions != dimensions {
            return Err(CaseError::mismatch("index dimensions", dimensions, info.dimensions).into());
        }
        let remaining = query::count_entities(ctx.store).await?;
        if remaining != 0 {
            return Err(CaseError::mismatch("entities after reset", 0, remaining).into());
        }

        Ok(format!(
            "index `{}` {action} ({dimensions} dims, {}); cleared {deleted} entities",
            info.name, info.state
        ))
    }
}

/// Load the fixture and reconcile counts.
#[derive(Debug)]
pub struct Ingestion;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl TestCase for Ingestion {
    fn name(&self) -> &str {
        "Ingestion"
    }

    fn description(&self) -> &str {
        "fixture entities and relationships written and counted"
    }

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String> {
        let summary = ingest::ingest(
            ctx.store,
            ctx.embedder,
            ctx.catalog,
            ctx.config.schema.batch_size,
        )
        .await?;

        let entities = query::count_entities(ctx.store).await?;
        let declared_entities = ctx.catalog.entities().len() as u64;
        if entities != declared_entities {
            return Err(CaseError::mismatch("entity count", declared_entities, entities).into());
        }
        let relationships = query::count_relationships(ctx.store).await?;
        let declared_relationships = ctx.catalog.relationships().len() as u64;
        if relationships != declared_relationships {
            return Err(CaseError::mismatch(
                "relationship count",
                declared_relationships,
                relationships,
            )
            .into());
        }

        Ok(format!(
            "{} entities, {} relationships loaded",
            summary.entities, summary.relationships
        ))
    }
}

/// Similarity search for the probe, then expand its graph neighbourhood.
#[derive(Debug)]
pub struct HybridSearch;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl TestCase for HybridSearch {
    fn name(&self) -> &str {
        "Hybrid Search"
    }

    fn description(&self) -> &str {
        "probe ranks first by similarity and its neighbours match the catalog"
    }

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String> {
        let settings = &ctx.config.harness;
        let probe = probe_entity(ctx, &ctx.catalog.probes().similarity)?;
        let vector = ctx.embedder.embed(&probe.description).await?;

        let hits = query::vector_search(
            ctx.store,
            &ctx.config.schema.index_name,
            &vector,
            settings.top_k,
        )
        .await?;
        let top = hits
            .first()
            .ok_or_else(|| CaseError::mismatch("rank 1", &probe.id, "no results"))?;
        if top.id != probe.id {
            return Err(CaseError::mismatch("rank 1", &probe.id, &top.id).into());
        }
        if top.score < settings.min_self_similarity {
            return Err(CaseError::mismatch(
                "self-similarity",
                format!(">= {}", settings.min_self_similarity),
                format!("{:.4}", top.score),
            )
            .into());
        }

        let expected = ctx.catalog.neighbors(&probe.id);
        let actual: BTreeSet<_> = query::neighbors(ctx.store, &top.id)
            .await?
            .into_iter()
            .collect();
        if actual != expected {
            return Err(CaseError::mismatch(
                format!("neighbours of {}", probe.id),
                format_set(&expected),
                format_set(&actual),
            )
            .into());
        }

        Ok(format!(
            "{} ranked 1 of {} (score {:.4}); {} neighbours match",
            probe.name,
            hits.len(),
            top.score,
            actual.len()
        ))
    }
}

/// Follow the catalog's traversal plan; similarity alone must not reach the same set.
#[derive(Debug)]
pub struct MultiHopTraversal;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl TestCase for MultiHopTraversal {
    fn name(&self) -> &str {
        "Multi-hop Traversal"
    }

    fn description(&self) -> &str {
        "typed multi-hop path reaches exactly the expected entities"
    }

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String> {
        let plan = &ctx.catalog.probes().traversal;
        let expected = ctx.catalog.expected_traversal();
        if expected.is_empty() {
            return Err(CaseError::mismatch(
                format!("catalog result of {plan}"),
                "at least one entity",
                "none",
            )
            .into());
        }

        let actual: BTreeSet<EntityId> = query::traverse(ctx.store, &plan.start, &plan.hops)
            .await?
            .into_iter()
            .collect();
        if actual != expected {
            return Err(CaseError::mismatch(
                format!("entities reached by {plan}"),
                format_set(&expected),
                format_set(&actual),
            )
            .into());
        }

        // Control: the start entity's nearest neighbours by vector alone. The
        // start always ranks itself first and is never part of the traversal
        // result, so fetch one extra hit and leave it out.
        let start = probe_entity(ctx, &plan.start)?;
        let vector = ctx.embedder.embed(&start.description).await?;
        let control: BTreeSet<EntityId> = query::vector_search(
            ctx.store,
            &ctx.config.schema.index_name,
            &vector,
            expected.len() + 1,
        )
        .await?
        .into_iter()
        .map(|hit| hit.id)
        .filter(|id| *id != plan.start)
        .take(expected.len())
        .collect();
        if control == expected {
            return Err(CaseError::mismatch(
                "similarity-only control",
                "a set different from the traversal result",
                format_set(&control),
            )
            .into());
        }
        let overlap = control.intersection(&expected).count();

        Ok(format!(
            "{} entities via {} hops; similarity-only top-{} shares {overlap}",
            actual.len(),
            plan.hops.len(),
            expected.len()
        ))
    }
}

/// Embeddings complete and relationships exactly as declared.
#[derive(Debug)]
pub struct Consistency;

#[async_trait::async_trait]
#[allow(clippy::unnecessary_literal_bound)]
impl TestCase for Consistency {
    fn name(&self) -> &str {
        "Consistency"
    }

    fn description(&self) -> &str {
        "stored graph matches the catalog exactly"
    }

    async fn run(&self, ctx: &CaseContext<'_>) -> crate::error::Result<String> {
        let report =
            consistency::check(ctx.store, ctx.catalog, ctx.config.embedding.dimensions).await?;
        if report.is_consistent() {
            Ok(report.describe())
        } else {
            Err(CaseError::mismatch("store contents", "the catalog", report.describe()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoundtripConfig;
    use crate::embed::MockEmbedder;
    use crate::fixture::FixtureCatalog;
    use crate::harness::{CaseStatus, Harness};
    use crate::progress::NoopReporter;
    use crate::store::SqliteStore;

    fn config() -> RoundtripConfig {
        let mut config = RoundtripConfig::default();
        config.store.password = "pw".into();
        config.embedding.dimensions = 64;
        config.schema.index_poll_interval_ms = 10;
        config
    }

    #[test]
    fn standard_cases_are_ordered() {
        let names: Vec<String> = standard_cases()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "Connectivity",
                "Initialization",
                "Ingestion",
                "Hybrid Search",
                "Multi-hop Traversal",
                "Consistency"
            ]
        );
    }

    #[tokio::test]
    async fn all_cases_pass_on_reference_store() {
        let config = config();
        let store = SqliteStore::in_memory(&config.store.namespace).unwrap();
        let embedder = MockEmbedder::new(64, 42);
        let harness = Harness::new(config, FixtureCatalog::health_care());
        let outcome = harness
            .run(&store, &embedder, &NoopReporter)
            .await
            .unwrap();
        for o in &outcome.outcomes {
            assert_eq!(o.status, CaseStatus::Passed, "{}: {:?}", o.name, o.failure);
        }
        assert!(outcome.all_passed());
    }

    #[tokio::test]
    async fn embedder_dimension_mismatch_is_fatal_at_initialization() {
        let config = config();
        let store = SqliteStore::in_memory(&config.store.namespace).unwrap();
        let embedder = MockEmbedder::new(32, 42);
        let harness = Harness::new(config, FixtureCatalog::health_care());
        let err = harness
            .run(&store, &embedder, &NoopReporter)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn sets_render_in_order() {
        let set: BTreeSet<EntityId> = ["b", "a"].into_iter().map(EntityId::from).collect();
        assert_eq!(format_set(&set), "{a, b}");
    }
}
