// Fixture catalog: the fixed dataset a verification run ingests and checks.
//
// Expected query results (declared counts, neighbours, multi-hop reachability)
// are derived from the catalog itself so custom fixtures work unchanged.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::FixtureError;
use crate::types::{
    Direction, EdgeTuple, Entity, EntityId, EntityKind, Hop, Neighbor, RelationKind, Relationship,
};

/// Minimum hops a traversal probe needs to prove graph-only reachability.
pub const MIN_TRAVERSAL_HOPS: usize = 3;
/// Upper bound on traversal depth; the store query is bounded by it.
pub const MAX_TRAVERSAL_HOPS: usize = 6;

/// Node attributes the stores set themselves; entity properties may not override them.
pub const RESERVED_PROPERTIES: &[&str] = &[
    "id",
    "namespace",
    "name",
    "kind",
    "description",
    "embedding",
    "created_at",
];

/// A multi-hop traversal: start entity plus an ordered list of typed hops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalPlan {
    pub start: EntityId,
    pub hops: Vec<Hop>,
}

impl std::fmt::Display for TraversalPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.start)?;
        for hop in &self.hops {
            write!(f, "{hop}()")?;
        }
        Ok(())
    }
}

/// Which entities the hybrid and multi-hop cases probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probes {
    /// Entity whose own embedding seeds the similarity query.
    pub similarity: EntityId,
    pub traversal: TraversalPlan,
}

/// Immutable, validated fixture: ordered entities, then ordered relationships.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixtureCatalog {
    probes: Probes,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

/// On-disk shape of a catalog file; validated through [`FixtureCatalog::new`].
#[derive(Deserialize)]
struct CatalogFile {
    probes: Probes,
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

impl FixtureCatalog {
    /// Build a catalog, rejecting duplicate ids, dangling references and bad probes.
    pub fn new(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        probes: Probes,
    ) -> Result<Self, FixtureError> {
        let mut ids = HashSet::with_capacity(entities.len());
        for entity in &entities {
            if !ids.insert(entity.id.clone()) {
                return Err(FixtureError::DuplicateEntity(entity.id.0.clone()));
            }
            if let Some(key) = entity
                .properties
                .keys()
                .find(|k| RESERVED_PROPERTIES.contains(&k.as_str()))
            {
                return Err(FixtureError::ReservedProperty {
                    id: entity.id.0.clone(),
                    key: key.clone(),
                });
            }
        }

        let mut tuples = BTreeSet::new();
        for (index, rel) in relationships.iter().enumerate() {
            let tuple = rel.tuple();
            if tuples.contains(&tuple) {
                return Err(FixtureError::DuplicateRelationship {
                    index,
                    edge: tuple.to_string(),
                });
            }
            tuples.insert(tuple);
            for endpoint in [&rel.source, &rel.target] {
                if !ids.contains(endpoint) {
                    return Err(FixtureError::DanglingReference {
                        index,
                        id: endpoint.0.clone(),
                    });
                }
            }
        }

        for probe in [&probes.similarity, &probes.traversal.start] {
            if !ids.contains(probe) {
                return Err(FixtureError::UnknownProbe(probe.0.clone()));
            }
        }

        let hop_count = probes.traversal.hops.len();
        if !(MIN_TRAVERSAL_HOPS..=MAX_TRAVERSAL_HOPS).contains(&hop_count) {
            return Err(FixtureError::HopCount {
                min: MIN_TRAVERSAL_HOPS,
                max: MAX_TRAVERSAL_HOPS,
                actual: hop_count,
            });
        }

        Ok(Self {
            probes,
            entities,
            relationships,
        })
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = std::fs::read_to_string(path).map_err(|e| FixtureError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, FixtureError> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| FixtureError::Parse(e.to_string()))?;
        Self::new(file.entities, file.relationships, file.probes)
    }

    pub fn to_toml_string(&self) -> Result<String, FixtureError> {
        toml::to_string_pretty(self).map_err(|e| FixtureError::Parse(e.to_string()))
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn probes(&self) -> &Probes {
        &self.probes
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.iter().find(|e| &e.id == id)
    }

    /// Every declared edge as a (source, kind, target) tuple, in catalog order.
    pub fn declared_tuples(&self) -> Vec<EdgeTuple> {
        self.relationships.iter().map(Relationship::tuple).collect()
    }

    /// Declared neighbours of `id` in both directions.
    pub fn neighbors(&self, id: &EntityId) -> BTreeSet<Neighbor> {
        let mut out = BTreeSet::new();
        for rel in &self.relationships {
            if &rel.source == id {
                out.insert(Neighbor {
                    direction: Direction::Out,
                    kind: rel.kind,
                    id: rel.target.clone(),
                });
            }
            if &rel.target == id {
                out.insert(Neighbor {
                    direction: Direction::In,
                    kind: rel.kind,
                    id: rel.source.clone(),
                });
            }
        }
        out
    }

    /// Entities reachable from `start` by following `hops` in order.
    pub fn traverse(&self, start: &EntityId, hops: &[Hop]) -> BTreeSet<EntityId> {
        let mut frontier = BTreeSet::from([start.clone()]);
        for hop in hops {
            let mut next = BTreeSet::new();
            for rel in self.relationships.iter().filter(|r| r.kind == hop.kind) {
                match hop.direction {
                    Direction::Out if frontier.contains(&rel.source) => {
                        next.insert(rel.target.clone());
                    }
                    Direction::In if frontier.contains(&rel.target) => {
                        next.insert(rel.source.clone());
                    }
                    _ => {}
                }
            }
            frontier = next;
        }
        frontier
    }

    /// The expected result set of the catalog's traversal probe.
    pub fn expected_traversal(&self) -> BTreeSet<EntityId> {
        let plan = &self.probes.traversal;
        self.traverse(&plan.start, &plan.hops)
    }

    /// The built-in cardiology fixture: 9 entities, 17 relationships.
    pub fn health_care() -> Self {
        use EntityKind::{Diagnosis, Document, Organization, Person, Symptom, Treatment};
        use RelationKind::{
            AuthoredBy, Cites, CollaboratesWith, Diagnoses, Discusses, ManifestsAs, Prescribes,
            TreatedBy, WorksIn,
        };

        let entities = vec![
            entity(
                "cardio-institute",
                "Heartline Cardiology Institute",
                Organization,
                "Regional cardiology center running arrhythmia clinics and outcome research programs",
                &[("founded", json!(1998)), ("city", json!("Portland"))],
            ),
            entity(
                "dr-chen",
                "Dr. Maya Chen",
                Person,
                "Electrophysiologist specialising in atrial arrhythmias and catheter ablation",
                &[("specialty", json!("electrophysiology"))],
            ),
            entity(
                "dr-okafor",
                "Dr. Samuel Okafor",
                Person,
                "Cardiologist leading pharmacological rate-control trials",
                &[("specialty", json!("clinical cardiology"))],
            ),
            entity(
                "af-guidelines",
                "Atrial Fibrillation Care Guidelines",
                Document,
                "Clinical guideline covering diagnosis, stroke prevention and anticoagulation in atrial fibrillation",
                &[("year", json!(2025)), ("doc_type", json!("guideline"))],
            ),
            entity(
                "rate-control-study",
                "Rate Control Outcomes Study",
                Document,
                "Cohort study comparing beta-blocker rate control outcomes in patients presenting with arrhythmia",
                &[("year", json!(2024)), ("doc_type", json!("study"))],
            ),
            entity(
                "arrhythmia",
                "Arrhythmia",
                Symptom,
                "Irregular heartbeat characterized by abnormal heart rhythm patterns",
                &[
                    ("severity", json!("high")),
                    ("category", json!("cardiovascular")),
                    ("icd10_code", json!("I49.9")),
                ],
            ),
            entity(
                "atrial-fibrillation",
                "Atrial Fibrillation",
                Diagnosis,
                "Specific type of arrhythmia involving rapid, irregular atrial contractions",
                &[
                    ("condition_type", json!("chronic")),
                    ("prevalence", json!("common")),
                    ("icd10_code", json!("I48.91")),
                ],
            ),
            entity(
                "beta-blocker-therapy",
                "Beta-Blocker Therapy",
                Treatment,
                "Medication that reduces heart rate and blood pressure by blocking adrenaline effects",
                &[
                    ("drug_class", json!("cardiovascular")),
                    ("administration", json!("oral")),
                    ("fda_approved", json!(true)),
                ],
            ),
            entity(
                "anticoagulation-therapy",
                "Anticoagulation Therapy",
                Treatment,
                "Blood-thinning treatment that lowers stroke risk in patients with atrial fibrillation",
                &[("administration", json!("oral"))],
            ),
        ];

        let relationships = vec![
            rel("dr-chen", WorksIn, "cardio-institute"),
            rel("dr-okafor", WorksIn, "cardio-institute"),
            rel("dr-chen", CollaboratesWith, "dr-okafor"),
            rel("af-guidelines", AuthoredBy, "dr-chen"),
            rel("rate-control-study", AuthoredBy, "dr-okafor"),
            rel("rate-control-study", AuthoredBy, "dr-chen"),
            rel("af-guidelines", Discusses, "atrial-fibrillation"),
            rel("af-guidelines", Discusses, "anticoagulation-therapy"),
            rel("rate-control-study", Discusses, "beta-blocker-therapy"),
            rel("rate-control-study", Discusses, "arrhythmia"),
            rel("af-guidelines", Cites, "rate-control-study"),
            rel("arrhythmia", ManifestsAs, "atrial-fibrillation"),
            rel("arrhythmia", TreatedBy, "beta-blocker-therapy"),
            rel("atrial-fibrillation", TreatedBy, "beta-blocker-therapy"),
            rel("atrial-fibrillation", TreatedBy, "anticoagulation-therapy"),
            rel("dr-okafor", Prescribes, "beta-blocker-therapy"),
            rel("dr-chen", Diagnoses, "atrial-fibrillation"),
        ];

        // organization <- person <- document -> topic
        let probes = Probes {
            similarity: EntityId::new("beta-blocker-therapy"),
            traversal: TraversalPlan {
                start: EntityId::new("cardio-institute"),
                hops: vec![
                    Hop::inbound(WorksIn),
                    Hop::inbound(AuthoredBy),
                    Hop::out(Discusses),
                ],
            },
        };

        Self::new(entities, relationships, probes).expect("built-in fixture is well-formed")
    }
}

fn entity(
    id: &str,
    name: &str,
    kind: EntityKind,
    description: &str,
    properties: &[(&str, serde_json::Value)],
) -> Entity {
    Entity {
        id: EntityId::new(id),
        name: name.to_string(),
        kind,
        description: description.to_string(),
        properties: properties
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect(),
    }
}

fn rel(source: &str, kind: RelationKind, target: &str) -> Relationship {
    Relationship {
        source: EntityId::new(source),
        kind,
        target: EntityId::new(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> BTreeSet<EntityId> {
        items.iter().map(|s| EntityId::new(*s)).collect()
    }

    #[test]
    fn health_care_fixture_has_declared_counts() {
        let catalog = FixtureCatalog::health_care();
        assert_eq!(catalog.entities().len(), 9);
        assert_eq!(catalog.relationships().len(), 17);
        assert!(
            catalog
                .entity(&EntityId::new("beta-blocker-therapy"))
                .is_some_and(|e| e.name == "Beta-Blocker Therapy")
        );
    }

    #[test]
    fn declared_tuples_are_unique() {
        let catalog = FixtureCatalog::health_care();
        let tuples = catalog.declared_tuples();
        let unique: BTreeSet<_> = tuples.iter().cloned().collect();
        assert_eq!(unique.len(), tuples.len());
    }

    #[test]
    fn traversal_probe_reaches_discussed_topics() {
        let catalog = FixtureCatalog::health_care();
        assert_eq!(
            catalog.expected_traversal(),
            ids(&[
                "anticoagulation-therapy",
                "arrhythmia",
                "atrial-fibrillation",
                "beta-blocker-therapy",
            ])
        );
    }

    #[test]
    fn traversal_probe_excludes_its_start() {
        let catalog = FixtureCatalog::health_care();
        let start = &catalog.probes().traversal.start;
        assert!(!catalog.expected_traversal().contains(start));
    }

    #[test]
    fn neighbors_cover_both_directions() {
        let catalog = FixtureCatalog::health_care();
        let n = catalog.neighbors(&EntityId::new("beta-blocker-therapy"));
        assert_eq!(n.len(), 4);
        assert!(n.iter().all(|nb| nb.direction == Direction::In));

        let chen = catalog.neighbors(&EntityId::new("dr-chen"));
        assert!(chen.contains(&Neighbor {
            direction: Direction::Out,
            kind: RelationKind::WorksIn,
            id: EntityId::new("cardio-institute"),
        }));
        assert!(chen.contains(&Neighbor {
            direction: Direction::In,
            kind: RelationKind::AuthoredBy,
            id: EntityId::new("af-guidelines"),
        }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = entity("a", "A", EntityKind::Topic, "first", &[]);
        let probes = Probes {
            similarity: EntityId::new("a"),
            traversal: TraversalPlan {
                start: EntityId::new("a"),
                hops: vec![Hop::out(RelationKind::Cites); 3],
            },
        };
        let err = FixtureCatalog::new(vec![a.clone(), a], vec![], probes).unwrap_err();
        assert!(matches!(err, FixtureError::DuplicateEntity(id) if id == "a"));
    }

    #[test]
    fn dangling_reference_reports_index() {
        let a = entity("a", "A", EntityKind::Topic, "first", &[]);
        let probes = Probes {
            similarity: EntityId::new("a"),
            traversal: TraversalPlan {
                start: EntityId::new("a"),
                hops: vec![Hop::out(RelationKind::Cites); 3],
            },
        };
        let rels = vec![rel("a", RelationKind::Cites, "a"), rel("a", RelationKind::Cites, "ghost")];
        let err = FixtureCatalog::new(vec![a], rels, probes).unwrap_err();
        assert!(matches!(
            err,
            FixtureError::DanglingReference { index: 1, ref id } if id == "ghost"
        ));
    }

    #[test]
    fn repeated_relationship_is_rejected() {
        let a = entity("a", "A", EntityKind::Topic, "first", &[]);
        let probes = Probes {
            similarity: EntityId::new("a"),
            traversal: TraversalPlan {
                start: EntityId::new("a"),
                hops: vec![Hop::out(RelationKind::Cites); 3],
            },
        };
        let rels = vec![rel("a", RelationKind::Cites, "a"), rel("a", RelationKind::Cites, "a")];
        let err = FixtureCatalog::new(vec![a], rels, probes).unwrap_err();
        assert!(matches!(
            err,
            FixtureError::DuplicateRelationship { index: 1, ref edge } if edge == "(a)-[CITES]->(a)"
        ));
    }

    #[test]
    fn reserved_property_is_rejected() {
        let a = entity("a", "A", EntityKind::Topic, "first", &[("namespace", json!("other"))]);
        let probes = Probes {
            similarity: EntityId::new("a"),
            traversal: TraversalPlan {
                start: EntityId::new("a"),
                hops: vec![Hop::out(RelationKind::Cites); 3],
            },
        };
        let err = FixtureCatalog::new(vec![a], vec![], probes).unwrap_err();
        assert!(matches!(
            err,
            FixtureError::ReservedProperty { ref id, ref key } if id == "a" && key == "namespace"
        ));
    }

    #[test]
    fn short_traversal_plan_is_rejected() {
        let a = entity("a", "A", EntityKind::Topic, "first", &[]);
        let probes = Probes {
            similarity: EntityId::new("a"),
            traversal: TraversalPlan {
                start: EntityId::new("a"),
                hops: vec![Hop::out(RelationKind::Cites); 2],
            },
        };
        let err = FixtureCatalog::new(vec![a], vec![], probes).unwrap_err();
        assert!(matches!(err, FixtureError::HopCount { actual: 2, .. }));
    }

    #[test]
    fn toml_round_trip_preserves_catalog() {
        let catalog = FixtureCatalog::health_care();
        let text = catalog.to_toml_string().unwrap();
        let back = FixtureCatalog::from_toml_str(&text).unwrap();
        assert_eq!(back, catalog);
    }

    #[test]
    fn unknown_relationship_kind_fails_at_load() {
        let text = r#"
            [probes]
            similarity = "a"
            [probes.traversal]
            start = "a"
            hops = [
                { kind = "CITES", direction = "out" },
                { kind = "CITES", direction = "out" },
                { kind = "CITES", direction = "out" },
            ]

            [[entities]]
            id = "a"
            name = "A"
            kind = "Topic"
            description = "only"

            [[relationships]]
            source = "a"
            kind = "RELATED_TO"
            target = "a"
        "#;
        let err = FixtureCatalog::from_toml_str(text).unwrap_err();
        assert!(matches!(err, FixtureError::Parse(_)));
    }

    #[test]
    fn plan_display_shows_directions() {
        let catalog = FixtureCatalog::health_care();
        assert_eq!(
            catalog.probes().traversal.to_string(),
            "(cardio-institute)<-[WORKS_IN]-()<-[AUTHORED_BY]-()-[DISCUSSES]->()"
        );
    }
}
