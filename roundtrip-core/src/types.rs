use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ── Identifiers ────────────────────────────────────────────────────

/// Stable entity identifier, unique within a run. Relationships match on this,
/// never on display names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ── Entity kinds ───────────────────────────────────────────────────

/// Closed set of node kinds the fixture may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Person,
    Organization,
    Document,
    Symptom,
    Treatment,
    Diagnosis,
    Topic,
}

impl EntityKind {
    pub const ALL: [Self; 7] = [
        Self::Person,
        Self::Organization,
        Self::Document,
        Self::Symptom,
        Self::Treatment,
        Self::Diagnosis,
        Self::Topic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Document => "Document",
            Self::Symptom => "Symptom",
            Self::Treatment => "Treatment",
            Self::Diagnosis => "Diagnosis",
            Self::Topic => "Topic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Relationship kinds ─────────────────────────────────────────────

/// Closed set of directed edge types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// Document → Person.
    AuthoredBy,
    /// Symptom/Diagnosis → Treatment.
    TreatedBy,
    /// Document → any subject.
    Discusses,
    /// Person → Organization.
    WorksIn,
    /// Person → Person.
    CollaboratesWith,
    /// Symptom → Diagnosis.
    ManifestsAs,
    /// Person → Treatment.
    Prescribes,
    /// Person → Diagnosis.
    Diagnoses,
    /// Document → Document.
    Cites,
}

impl RelationKind {
    pub const ALL: [Self; 9] = [
        Self::AuthoredBy,
        Self::TreatedBy,
        Self::Discusses,
        Self::WorksIn,
        Self::CollaboratesWith,
        Self::ManifestsAs,
        Self::Prescribes,
        Self::Diagnoses,
        Self::Cites,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthoredBy => "AUTHORED_BY",
            Self::TreatedBy => "TREATED_BY",
            Self::Discusses => "DISCUSSES",
            Self::WorksIn => "WORKS_IN",
            Self::CollaboratesWith => "COLLABORATES_WITH",
            Self::ManifestsAs => "MANIFESTS_AS",
            Self::Prescribes => "PRESCRIBES",
            Self::Diagnoses => "DIAGNOSES",
            Self::Cites => "CITES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Fixture records ────────────────────────────────────────────────

/// A typed node as declared in the fixture catalog (no embedding yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    /// Free text the embedding is derived from.
    pub description: String,
    /// Extra scalar attributes written onto the node.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// A typed directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub kind: RelationKind,
    pub target: EntityId,
}

impl Relationship {
    pub fn tuple(&self) -> EdgeTuple {
        EdgeTuple {
            source: self.source.clone(),
            kind: self.kind,
            target: self.target.clone(),
        }
    }
}

/// An entity together with its computed embedding, ready to write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub description: String,
    pub embedding: Vec<f32>,
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl EntityRecord {
    pub fn from_entity(entity: &Entity, embedding: Vec<f32>) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            kind: entity.kind,
            description: entity.description.clone(),
            embedding,
            properties: entity.properties.clone(),
        }
    }
}

// ── Query shapes ───────────────────────────────────────────────────

/// The identity of an edge for multiset comparison: (source, kind, target).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeTuple {
    pub source: EntityId,
    pub kind: RelationKind,
    pub target: EntityId,
}

impl fmt::Display for EdgeTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.source, self.kind, self.target)
    }
}

/// Edge direction relative to the node a hop starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges whose source is the current node.
    Out,
    /// Follow edges whose target is the current node.
    In,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Out => "out",
            Self::In => "in",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "out" => Some(Self::Out),
            "in" => Some(Self::In),
            _ => None,
        }
    }
}

/// One step of a traversal plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hop {
    pub kind: RelationKind,
    pub direction: Direction,
}

impl Hop {
    pub fn out(kind: RelationKind) -> Self {
        Self {
            kind,
            direction: Direction::Out,
        }
    }

    pub fn inbound(kind: RelationKind) -> Self {
        Self {
            kind,
            direction: Direction::In,
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Out => write!(f, "-[{}]->", self.kind),
            Direction::In => write!(f, "<-[{}]-", self.kind),
        }
    }
}

/// A similarity search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub score: f64,
}

/// An entity adjacent to a given node, with the connecting edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Neighbor {
    pub direction: Direction,
    pub kind: RelationKind,
    pub id: EntityId,
}

impl fmt::Display for Neighbor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Out => write!(f, "-[{}]->({})", self.kind, self.id),
            Direction::In => write!(f, "<-[{}]-({})", self.kind, self.id),
        }
    }
}

/// Similarity function of a vector index. Only cosine is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityFunction {
    #[default]
    Cosine,
}

impl SimilarityFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
        }
    }

    /// Parse case-insensitively; stores report `COSINE` or `cosine`.
    pub fn parse(s: &str) -> Option<Self> {
        s.eq_ignore_ascii_case("cosine").then_some(Self::Cosine)
    }
}

impl fmt::Display for SimilarityFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a vector index as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub dimensions: usize,
    pub similarity: Option<SimilarityFunction>,
    pub state: String,
}

impl IndexInfo {
    pub fn is_online(&self) -> bool {
        self.state.eq_ignore_ascii_case("online")
    }
}

/// Cosine similarity between two vectors; 0.0 when either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
