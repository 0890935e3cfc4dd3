//! Core type definitions for graphloom.

mod candidate;
mod chunk;
mod entity;
mod graph;

pub use candidate::{CandidateEntity, CandidateRelation, Extraction};
pub use chunk::Chunk;
pub use entity::EntityType;
pub use graph::{
    entity_id, relation_id, ArticleRecord, Entity, EntityId, GraphStats, Relation, RelationId,
    GLOBAL_SCOPE,
};
