//! Candidate resolution and merging.
//!
//! Converts the candidate entities/relations accumulated across all
//! chunks of a run into a minimal, deduplicated set of graph upserts.
//! The algorithm is deliberately order-independent: aggregation uses
//! only commutative operations (union and max over sets) and every tie
//! is broken by a fixed ordering, so any permutation of chunk
//! completions produces an identical entity set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::MergeScope;
use crate::types::{
    entity_id, relation_id, CandidateEntity, CandidateRelation, Entity, EntityId, EntityType,
    Relation, GLOBAL_SCOPE,
};

use super::normalize::{normalization_key, normalize_predicate};

/// Configuration for candidate resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Scope within which same-key entities merge.
    pub scope: MergeScope,
    /// Candidates below this confidence are discarded before grouping.
    pub min_confidence: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            scope: MergeScope::Global,
            min_confidence: 0.0,
        }
    }
}

impl MergeConfig {
    /// Create a config for the given scope.
    pub fn with_scope(scope: MergeScope) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    /// Set the confidence floor.
    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = min;
        self
    }
}

/// Why a candidate relation was excluded from the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Subject name did not resolve to any entity.
    UnresolvedSubject,
    /// Object name did not resolve to any entity.
    UnresolvedObject,
    /// Predicate normalized to the empty string.
    EmptyPredicate,
}

/// A relation excluded during resolution, reported in the run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedRelation {
    pub subject_name: String,
    pub predicate: String,
    pub object_name: String,
    pub reason: DropReason,
}

/// A type conflict resolved during entity merging.
///
/// The winning type's entity absorbs the losing candidates' names as
/// aliases; no separate entity is created for the losing type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConflict {
    /// Canonical name of the surviving entity.
    pub name: String,
    pub winner: EntityType,
    pub loser: EntityType,
    /// Aggregate confidence backing the winning type.
    pub winner_confidence: f64,
    /// Aggregate confidence of the losing type.
    pub loser_confidence: f64,
}

/// The output of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Deduplicated entities, ready to upsert.
    pub entities: Vec<Entity>,
    /// Deduplicated relation edges, ready to upsert.
    pub relations: Vec<Relation>,
    /// Relations excluded because an endpoint did not resolve.
    pub dropped_relations: Vec<DroppedRelation>,
    /// Type conflicts resolved by the higher-aggregate-confidence rule.
    pub type_conflicts: Vec<TypeConflict>,
}

/// Entity/relation resolver.
pub struct EntityResolver {
    config: MergeConfig,
}

impl EntityResolver {
    /// Create a resolver with the given config.
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Get the merge config.
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Resolve all candidates of one run into graph upserts.
    ///
    /// `article_id` selects the entity scope when the config uses
    /// article-level merging; `article_url` is recorded as provenance
    /// on new entities and relations.
    pub fn resolve(
        &self,
        article_id: &str,
        article_url: Option<&str>,
        entities: &[CandidateEntity],
        relations: &[CandidateRelation],
    ) -> Resolution {
        let scope_key = match self.config.scope {
            MergeScope::Global => GLOBAL_SCOPE.to_string(),
            MergeScope::Article => format!("article:{}", article_id),
        };

        let mut resolution = Resolution::default();

        // Group candidates by normalization key. BTreeMap keeps every
        // later step in a fixed iteration order.
        let mut groups: BTreeMap<String, Vec<&CandidateEntity>> = BTreeMap::new();
        for candidate in entities {
            if candidate.confidence < self.config.min_confidence {
                continue;
            }
            let key = normalization_key(&candidate.name);
            if key.is_empty() {
                continue;
            }
            groups.entry(key).or_default().push(candidate);
        }

        // key -> resolved entity id, used for relation endpoint lookup.
        let mut key_to_id: BTreeMap<String, EntityId> = BTreeMap::new();
        let mut resolved: BTreeMap<EntityId, Entity> = BTreeMap::new();

        for (key, mut group) in groups {
            // Fixed intra-group order so floating-point aggregation is
            // identical for every arrival permutation.
            group.sort_by(|a, b| {
                (&a.source_chunk_id, &a.name, a.confidence.to_bits()).cmp(&(
                    &b.source_chunk_id,
                    &b.name,
                    b.confidence.to_bits(),
                ))
            });
            group.dedup_by(|a, b| {
                a.source_chunk_id == b.source_chunk_id
                    && a.name == b.name
                    && a.confidence.to_bits() == b.confidence.to_bits()
                    && a.entity_type == b.entity_type
            });

            // Aggregate confidence per type; the strongest type wins,
            // ties broken by the fixed EntityType ordering.
            let mut by_type: BTreeMap<EntityType, f64> = BTreeMap::new();
            for candidate in &group {
                *by_type.entry(candidate.entity_type).or_insert(0.0) += candidate.confidence;
            }
            let (&winner, &winner_agg) = by_type
                .iter()
                .max_by(|(ta, ca), (tb, cb)| {
                    ca.partial_cmp(cb)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        // On equal aggregates prefer the earlier type,
                        // i.e. the later type loses the max.
                        .then_with(|| tb.cmp(ta))
                })
                .expect("group is non-empty");

            // Canonical name: highest-confidence candidate of the
            // winning type; ties go to the lexicographically smaller
            // raw name.
            let best = group
                .iter()
                .filter(|c| c.entity_type == winner)
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| b.name.cmp(&a.name))
                })
                .expect("winning type has at least one candidate");
            let canonical_name = best.name.trim().to_string();
            let confidence = group
                .iter()
                .filter(|c| c.entity_type == winner)
                .map(|c| c.confidence)
                .fold(0.0_f64, f64::max);

            for (&loser, &loser_agg) in by_type.iter().filter(|(t, _)| **t != winner) {
                warn!(
                    name = %canonical_name,
                    winner = %winner,
                    loser = %loser,
                    "type conflict resolved by aggregate confidence"
                );
                resolution.type_conflicts.push(TypeConflict {
                    name: canonical_name.clone(),
                    winner,
                    loser,
                    winner_confidence: winner_agg,
                    loser_confidence: loser_agg,
                });
            }

            let id = entity_id(&scope_key, winner, &key);
            let entity = Entity {
                id: id.clone(),
                canonical_name,
                entity_type: winner,
                // Losing-type names survive only as aliases, never as a
                // separate entity.
                aliases: group.iter().map(|c| c.name.trim().to_string()).collect(),
                confidence,
                article_url: article_url.map(str::to_string),
                source_chunk_ids: group.iter().map(|c| c.source_chunk_id.clone()).collect(),
            };
            key_to_id.insert(key, id.clone());
            resolved.insert(id, entity);
        }

        // Relations resolve strictly after entities so endpoint lookup
        // sees the final winner per key.
        let mut edges: BTreeMap<String, Relation> = BTreeMap::new();
        for candidate in relations {
            let predicate = normalize_predicate(&candidate.predicate);
            if predicate.is_empty() {
                resolution.dropped_relations.push(dropped(candidate, DropReason::EmptyPredicate));
                continue;
            }

            let subject_key = normalization_key(&candidate.subject_name);
            let Some(subject_id) = key_to_id.get(&subject_key) else {
                debug!(subject = %candidate.subject_name, "dropping relation with unresolved subject");
                resolution
                    .dropped_relations
                    .push(dropped(candidate, DropReason::UnresolvedSubject));
                continue;
            };
            let object_key = normalization_key(&candidate.object_name);
            let Some(object_id) = key_to_id.get(&object_key) else {
                debug!(object = %candidate.object_name, "dropping relation with unresolved object");
                resolution
                    .dropped_relations
                    .push(dropped(candidate, DropReason::UnresolvedObject));
                continue;
            };

            let id = relation_id(subject_id, &predicate, object_id);
            match edges.get_mut(&id) {
                Some(existing) => {
                    if candidate.confidence > existing.confidence {
                        existing.confidence = candidate.confidence;
                    }
                }
                None => {
                    edges.insert(
                        id.clone(),
                        Relation {
                            id,
                            subject_id: subject_id.clone(),
                            predicate,
                            object_id: object_id.clone(),
                            confidence: candidate.confidence,
                            article_url: article_url.map(str::to_string),
                        },
                    );
                }
            }
        }

        resolution.entities = resolved.into_values().collect();
        resolution.relations = edges.into_values().collect();
        // Manifest entries in a fixed order regardless of arrival order.
        resolution.dropped_relations.sort_by(|a, b| {
            (&a.subject_name, &a.predicate, &a.object_name).cmp(&(
                &b.subject_name,
                &b.predicate,
                &b.object_name,
            ))
        });
        resolution
            .type_conflicts
            .sort_by(|a, b| (&a.name, a.loser).cmp(&(&b.name, b.loser)));

        resolution
    }
}

fn dropped(candidate: &CandidateRelation, reason: DropReason) -> DroppedRelation {
    DroppedRelation {
        subject_name: candidate.subject_name.clone(),
        predicate: candidate.predicate.clone(),
        object_name: candidate.object_name.clone(),
        reason,
    }
}
