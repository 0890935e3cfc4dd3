//! Candidate entities and relations.
//!
//! Candidates are the unmerged proposals returned by one chunk's
//! extraction call. They are ephemeral: the resolver consumes them and
//! they are never persisted directly.

use serde::{Deserialize, Serialize};

use super::entity::EntityType;

/// An entity proposal from a single chunk extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntity {
    /// Raw name as it appeared in the oracle output.
    pub name: String,
    /// Entity type.
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// Oracle confidence in [0, 1].
    pub confidence: f64,
    /// Id of the chunk this candidate came from.
    pub source_chunk_id: String,
}

impl CandidateEntity {
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        confidence: f64,
        source_chunk_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            source_chunk_id: source_chunk_id.into(),
        }
    }
}

/// A relation proposal from a single chunk extraction.
///
/// Subject and object are raw names; the resolver maps them to entity
/// ids after entities are resolved, and drops relations whose endpoints
/// cannot be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRelation {
    pub subject_name: String,
    pub predicate: String,
    pub object_name: String,
    pub confidence: f64,
    pub source_chunk_id: String,
}

impl CandidateRelation {
    pub fn new(
        subject_name: impl Into<String>,
        predicate: impl Into<String>,
        object_name: impl Into<String>,
        confidence: f64,
        source_chunk_id: impl Into<String>,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            predicate: predicate.into(),
            object_name: object_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source_chunk_id: source_chunk_id.into(),
        }
    }
}

/// The normalized output of one chunk extraction call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<CandidateEntity>,
    pub relations: Vec<CandidateRelation>,
}

impl Extraction {
    /// True if the extraction produced nothing.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}
