//! Graph store trait and related types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::GraphloomResult;
use crate::types::{ArticleRecord, Entity, EntityId, EntityType, GraphStats, Relation, RelationId};

/// Core GraphStore trait - all graph store backends implement this.
///
/// Upserts are idempotent: records are keyed by their deterministic id,
/// and an upsert of an already-present id merges (alias/provenance
/// union, confidence max) instead of duplicating. That idempotence is
/// what makes concurrent runs touching overlapping entities safe
/// without cross-run locking.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or merge an entity. Returns the entity id.
    async fn upsert_entity(&self, entity: &Entity) -> GraphloomResult<EntityId>;

    /// Insert or merge a relation edge. Returns the relation id.
    async fn upsert_relation(&self, relation: &Relation) -> GraphloomResult<RelationId>;

    /// Insert or update article metadata, keyed by URL.
    async fn upsert_article(&self, article: &ArticleRecord) -> GraphloomResult<()>;

    /// Fetch an entity by id.
    async fn get_entity(&self, id: &str) -> GraphloomResult<Option<Entity>>;

    /// Fetch article metadata by URL.
    async fn get_article(&self, url: &str) -> GraphloomResult<Option<ArticleRecord>>;

    /// All entities attributed to an article.
    async fn get_entities_by_article(&self, article_url: &str) -> GraphloomResult<Vec<Entity>>;

    /// All entities of a given type.
    async fn query_by_type(&self, entity_type: EntityType) -> GraphloomResult<Vec<Entity>>;

    /// All relations where the entity is subject or object.
    async fn get_relations_for_entity(&self, entity_id: &str) -> GraphloomResult<Vec<Relation>>;

    /// Aggregate graph statistics.
    async fn stats(&self) -> GraphloomResult<GraphStats>;

    /// Top-confidence entities, capped at `limit`.
    async fn snapshot(&self, limit: usize) -> GraphloomResult<Vec<Entity>>;
}

/// Graph store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStoreConfig {
    /// Provider type.
    pub provider: GraphStoreProvider,
    /// Database path for file-backed providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for GraphStoreConfig {
    fn default() -> Self {
        Self {
            provider: GraphStoreProvider::InMemory,
            path: None,
        }
    }
}

/// Graph store provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GraphStoreProvider {
    /// In-memory reference backend; contents are lost on drop.
    #[default]
    InMemory,
    /// Durable SQLite document store.
    Sqlite,
}
