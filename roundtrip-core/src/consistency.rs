// Consistency checks between the fixture catalog and what the store holds.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::StoreError;
use crate::fixture::FixtureCatalog;
use crate::query;
use crate::store::StoreClient;
use crate::types::{EdgeTuple, EntityId};

/// Entities whose stored embedding is missing or of the wrong length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbeddingAudit {
    pub mismatched: u64,
    pub offending: Vec<EntityId>,
}

/// Multiset difference between declared and stored edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeDiff {
    /// Declared but not stored.
    pub missing: Vec<EdgeTuple>,
    /// Stored fewer times than declared but at least once: `(tuple, stored, declared)`.
    pub undercounted: Vec<(EdgeTuple, usize, usize)>,
    /// Stored more often than declared, with the stored multiplicity.
    pub duplicated: Vec<(EdgeTuple, usize)>,
    /// Stored but never declared.
    pub extra: Vec<EdgeTuple>,
}

impl EdgeDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
            && self.undercounted.is_empty()
            && self.duplicated.is_empty()
            && self.extra.is_empty()
    }
}

/// Compare declared edges against stored edges as multisets of tuples.
pub fn diff_relationships(declared: &[EdgeTuple], stored: &[EdgeTuple]) -> EdgeDiff {
    let mut expected: BTreeMap<&EdgeTuple, usize> = BTreeMap::new();
    for t in declared {
        *expected.entry(t).or_default() += 1;
    }
    let mut actual: BTreeMap<&EdgeTuple, usize> = BTreeMap::new();
    for t in stored {
        *actual.entry(t).or_default() += 1;
    }

    let mut diff = EdgeDiff::default();
    for (tuple, &want) in &expected {
        match actual.get(tuple).copied().unwrap_or(0) {
            0 => diff.missing.push((*tuple).clone()),
            have if have < want => diff.undercounted.push(((*tuple).clone(), have, want)),
            have if have > want => diff.duplicated.push(((*tuple).clone(), have)),
            _ => {}
        }
    }
    for (tuple, &have) in &actual {
        if !expected.contains_key(tuple) {
            diff.extra.push((*tuple).clone());
            if have > 1 {
                diff.duplicated.push(((*tuple).clone(), have));
            }
        }
    }
    diff
}

/// Everything the consistency case checks, gathered in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub declared_entities: u64,
    pub stored_entities: u64,
    pub declared_relationships: u64,
    pub stored_relationships: u64,
    pub embeddings: EmbeddingAudit,
    pub edges: EdgeDiff,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.declared_entities == self.stored_entities
            && self.declared_relationships == self.stored_relationships
            && self.embeddings.mismatched == 0
            && self.edges.is_empty()
    }

    /// One-line summary for the report's details column.
    pub fn describe(&self) -> String {
        let mut out = format!(
            "nodes {}/{}, relationships {}/{}, embedding mismatches {}",
            self.stored_entities,
            self.declared_entities,
            self.stored_relationships,
            self.declared_relationships,
            self.embeddings.mismatched
        );
        if !self.embeddings.offending.is_empty() {
            let ids: Vec<&str> = self.embeddings.offending.iter().map(EntityId::as_str).collect();
            let _ = write!(out, " [{}]", ids.join(", "));
        }
        for t in &self.edges.missing {
            let _ = write!(out, "; missing {t}");
        }
        for (t, have, want) in &self.edges.undercounted {
            let _ = write!(out, "; missing {t} x{} (stored {have} of {want})", want - have);
        }
        for (t, n) in &self.edges.duplicated {
            let _ = write!(out, "; duplicated {t} x{n}");
        }
        for t in &self.edges.extra {
            let _ = write!(out, "; unexpected {t}");
        }
        out
    }
}

/// Gather counts, embedding audit and edge diff for the session namespace.
pub async fn check(
    store: &dyn StoreClient,
    catalog: &FixtureCatalog,
    dimensions: usize,
) -> Result<ConsistencyReport, StoreError> {
    let stored_entities = query::count_entities(store).await?;
    let stored_relationships = query::count_relationships(store).await?;
    let (mismatched, offending) = query::embedding_mismatches(store, dimensions).await?;
    let stored = query::list_edges(store).await?;
    let declared = catalog.declared_tuples();

    Ok(ConsistencyReport {
        declared_entities: catalog.entities().len() as u64,
        stored_entities,
        declared_relationships: declared.len() as u64,
        stored_relationships,
        embeddings: EmbeddingAudit {
            mismatched,
            offending,
        },
        edges: diff_relationships(&declared, &stored),
    })
}
