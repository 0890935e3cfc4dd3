//! In-memory graph store.
//!
//! The reference backend: fast, dependency-free, and the behavioral
//! baseline the durable backends are tested against. Contents are lost
//! on drop.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use graphloom_core::{
    ArticleRecord, Entity, EntityId, EntityType, GraphStats, GraphStore, GraphloomResult, Relation,
    RelationId,
};

#[derive(Default)]
struct Inner {
    entities: HashMap<EntityId, Entity>,
    relations: HashMap<RelationId, Relation>,
    articles: HashMap<String, ArticleRecord>,
}

/// In-memory `GraphStore` backend.
#[derive(Default)]
pub struct InMemoryGraphStore {
    inner: RwLock<Inner>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_entity(&self, entity: &Entity) -> GraphloomResult<EntityId> {
        let mut inner = self.inner.write().await;
        match inner.entities.get_mut(&entity.id) {
            Some(existing) => existing.merge_from(entity),
            None => {
                inner.entities.insert(entity.id.clone(), entity.clone());
            }
        }
        Ok(entity.id.clone())
    }

    async fn upsert_relation(&self, relation: &Relation) -> GraphloomResult<RelationId> {
        let mut inner = self.inner.write().await;
        match inner.relations.get_mut(&relation.id) {
            Some(existing) => existing.merge_from(relation),
            None => {
                inner.relations.insert(relation.id.clone(), relation.clone());
            }
        }
        Ok(relation.id.clone())
    }

    async fn upsert_article(&self, article: &ArticleRecord) -> GraphloomResult<()> {
        let mut inner = self.inner.write().await;
        match inner.articles.get_mut(&article.url) {
            Some(existing) => merge_article(existing, article),
            None => {
                inner.articles.insert(article.url.clone(), article.clone());
            }
        }
        Ok(())
    }

    async fn get_entity(&self, id: &str) -> GraphloomResult<Option<Entity>> {
        Ok(self.inner.read().await.entities.get(id).cloned())
    }

    async fn get_article(&self, url: &str) -> GraphloomResult<Option<ArticleRecord>> {
        Ok(self.inner.read().await.articles.get(url).cloned())
    }

    async fn get_entities_by_article(&self, article_url: &str) -> GraphloomResult<Vec<Entity>> {
        let inner = self.inner.read().await;
        let mut entities: Vec<Entity> = inner
            .entities
            .values()
            .filter(|e| e.article_url.as_deref() == Some(article_url))
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    async fn query_by_type(&self, entity_type: EntityType) -> GraphloomResult<Vec<Entity>> {
        let inner = self.inner.read().await;
        let mut entities: Vec<Entity> = inner
            .entities
            .values()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    async fn get_relations_for_entity(&self, entity_id: &str) -> GraphloomResult<Vec<Relation>> {
        let inner = self.inner.read().await;
        let mut relations: Vec<Relation> = inner
            .relations
            .values()
            .filter(|r| r.subject_id == entity_id || r.object_id == entity_id)
            .cloned()
            .collect();
        relations.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(relations)
    }

    async fn stats(&self) -> GraphloomResult<GraphStats> {
        let inner = self.inner.read().await;
        let mut stats = GraphStats {
            entity_count: inner.entities.len(),
            relation_count: inner.relations.len(),
            article_count: inner.articles.len(),
            ..Default::default()
        };
        for entity in inner.entities.values() {
            *stats
                .entities_by_type
                .entry(entity.entity_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn snapshot(&self, limit: usize) -> GraphloomResult<Vec<Entity>> {
        let inner = self.inner.read().await;
        let mut entities: Vec<Entity> = inner.entities.values().cloned().collect();
        entities.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.canonical_name.cmp(&b.canonical_name))
        });
        entities.truncate(limit);
        Ok(entities)
    }
}

/// Article upserts never erase what a later pipeline stage already
/// filled in: empty incoming fields keep the stored value.
pub(crate) fn merge_article(existing: &mut ArticleRecord, incoming: &ArticleRecord) {
    if !incoming.title.is_empty() {
        existing.title = incoming.title.clone();
    }
    if !incoming.summary.is_empty() {
        existing.summary = incoming.summary.clone();
    }
    if !incoming.key_points.is_empty() {
        existing.key_points = incoming.key_points.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphloom_core::entity_id;
    use std::collections::BTreeSet;

    fn entity(name: &str, entity_type: EntityType, confidence: f64) -> Entity {
        let key = name.to_lowercase();
        Entity {
            id: entity_id("global", entity_type, &key),
            canonical_name: name.to_string(),
            entity_type,
            aliases: BTreeSet::from([name.to_string()]),
            confidence,
            article_url: Some("https://example.org/a1".to_string()),
            source_chunk_ids: BTreeSet::from(["chunk-1".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_upsert_entity_merges_on_conflict() {
        let store = InMemoryGraphStore::new();
        let first = entity("Acme", EntityType::Organization, 0.6);

        let mut second = first.clone();
        second.aliases.insert("Acme Corp".to_string());
        second.confidence = 0.9;

        store.upsert_entity(&first).await.unwrap();
        store.upsert_entity(&second).await.unwrap();

        let stored = store.get_entity(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.confidence, 0.9);
        assert!(stored.aliases.contains("Acme Corp"));
        assert_eq!(store.stats().await.unwrap().entity_count, 1);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let e = entity("Acme", EntityType::Organization, 0.8);

        store.upsert_entity(&e).await.unwrap();
        store.upsert_entity(&e).await.unwrap();
        store.upsert_entity(&e).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entity_count, 1);
        assert_eq!(
            store.get_entity(&e.id).await.unwrap().unwrap(),
            e
        );
    }

    #[tokio::test]
    async fn test_queries() {
        let store = InMemoryGraphStore::new();
        let org = entity("Acme", EntityType::Organization, 0.9);
        let person = entity("Alice", EntityType::Person, 0.7);
        store.upsert_entity(&org).await.unwrap();
        store.upsert_entity(&person).await.unwrap();

        let relation = Relation {
            id: "rel-1".to_string(),
            subject_id: person.id.clone(),
            predicate: "WORKS_FOR".to_string(),
            object_id: org.id.clone(),
            confidence: 0.8,
            article_url: None,
        };
        store.upsert_relation(&relation).await.unwrap();

        let orgs = store.query_by_type(EntityType::Organization).await.unwrap();
        assert_eq!(orgs.len(), 1);

        let by_article = store
            .get_entities_by_article("https://example.org/a1")
            .await
            .unwrap();
        assert_eq!(by_article.len(), 2);

        let edges = store.get_relations_for_entity(&org.id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].predicate, "WORKS_FOR");

        let top = store.snapshot(1).await.unwrap();
        assert_eq!(top[0].canonical_name, "Acme");
    }

    #[tokio::test]
    async fn test_article_merge_keeps_filled_fields() {
        let store = InMemoryGraphStore::new();
        store
            .upsert_article(&ArticleRecord {
                url: "https://example.org/a1".into(),
                title: "Title".into(),
                summary: "A summary.".into(),
                key_points: vec!["point".into()],
            })
            .await
            .unwrap();

        // A later bare upsert must not wipe the summary.
        store
            .upsert_article(&ArticleRecord {
                url: "https://example.org/a1".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let stored = store.get_article("https://example.org/a1").await.unwrap().unwrap();
        assert_eq!(stored.summary, "A summary.");
        assert_eq!(stored.title, "Title");
    }
}
