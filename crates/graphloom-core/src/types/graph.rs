//! Persisted graph types and deterministic id derivation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::entity::EntityType;

/// Entity identifier. Deterministic function of
/// `(normalized_name, type, scope)`, see [`entity_id`].
pub type EntityId = String;

/// Relation identifier. Deterministic function of
/// `(subject_id, predicate, object_id)`, see [`relation_id`].
pub type RelationId = String;

/// Scope key used when entities merge across the whole graph rather
/// than per article.
pub const GLOBAL_SCOPE: &str = "global";

fn short_digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0x1f]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())[..32].to_string()
}

/// Derive the deterministic id for an entity.
///
/// `normalized_name` must already be a normalization key (see
/// `resolver::normalization_key`). Determinism here is what makes
/// graph-store upserts idempotent: the same logical entity always maps
/// to the same storage key, no matter which run or chunk produced it.
pub fn entity_id(scope: &str, entity_type: EntityType, normalized_name: &str) -> EntityId {
    format!(
        "ent-{}",
        short_digest(&[scope, entity_type.as_str(), normalized_name])
    )
}

/// Derive the deterministic id for a relation edge.
pub fn relation_id(subject_id: &str, predicate: &str, object_id: &str) -> RelationId {
    format!("rel-{}", short_digest(&[subject_id, predicate, object_id]))
}

/// A persisted knowledge-graph entity.
///
/// Sets use `BTreeSet` so serialized output and merge results are
/// deterministic regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub canonical_name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub aliases: BTreeSet<String>,
    pub confidence: f64,
    pub article_url: Option<String>,
    pub source_chunk_ids: BTreeSet<String>,
}

impl Entity {
    /// Merge another record for the same entity into this one.
    ///
    /// Aliases and provenance union; confidence takes the max. Union
    /// and max are commutative and idempotent, which is what makes the
    /// merge order-independent.
    pub fn merge_from(&mut self, other: &Entity) {
        debug_assert_eq!(self.id, other.id);
        self.aliases.extend(other.aliases.iter().cloned());
        self.source_chunk_ids
            .extend(other.source_chunk_ids.iter().cloned());
        if other.confidence > self.confidence {
            self.confidence = other.confidence;
        }
        if self.article_url.is_none() {
            self.article_url = other.article_url.clone();
        }
    }
}

/// A persisted relation between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub subject_id: EntityId,
    pub predicate: String,
    pub object_id: EntityId,
    pub confidence: f64,
    pub article_url: Option<String>,
}

impl Relation {
    /// Merge a duplicate edge: confidence max, never a second edge.
    pub fn merge_from(&mut self, other: &Relation) {
        debug_assert_eq!(self.id, other.id);
        if other.confidence > self.confidence {
            self.confidence = other.confidence;
        }
        if self.article_url.is_none() {
            self.article_url = other.article_url.clone();
        }
    }
}

/// Persisted article metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
}

/// Aggregate graph statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub entity_count: usize,
    pub relation_count: usize,
    pub article_count: usize,
    pub entities_by_type: BTreeMap<String, usize>,
}
