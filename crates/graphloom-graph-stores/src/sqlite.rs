//! SQLite-backed graph store.
//!
//! A durable document store: each entity, relation and article is one
//! row with its JSON payload, merged in a transaction on upsert.
//! Frequently-queried fields (type, article URL, confidence, edge
//! endpoints) are mirrored into indexed columns.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use graphloom_core::{
    ArticleRecord, Entity, EntityId, EntityType, GraphStats, GraphStore, GraphloomResult, Relation,
    RelationId,
};

use crate::memory::merge_article;

/// SQLite `GraphStore` backend.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

impl SqliteGraphStore {
    /// Create a new store at the given path.
    pub fn new(path: impl AsRef<Path>) -> GraphloomResult<Self> {
        debug!(path = %path.as_ref().display(), "opening sqlite graph store");
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> GraphloomResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> GraphloomResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                article_url TEXT,
                confidence REAL NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);
            CREATE INDEX IF NOT EXISTS idx_entities_article ON entities(article_url);
            CREATE INDEX IF NOT EXISTS idx_entities_confidence ON entities(confidence);

            CREATE TABLE IF NOT EXISTS relations (
                id TEXT PRIMARY KEY,
                subject_id TEXT NOT NULL,
                object_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_relations_subject ON relations(subject_id);
            CREATE INDEX IF NOT EXISTS idx_relations_object ON relations(object_id);

            CREATE TABLE IF NOT EXISTS articles (
                url TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(())
    }

    fn decode_entity(payload: &str) -> GraphloomResult<Entity> {
        Ok(serde_json::from_str(payload)?)
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_entity(&self, entity: &Entity) -> GraphloomResult<EntityId> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT payload FROM entities WHERE id = ?1",
                params![entity.id],
                |row| row.get(0),
            )
            .optional()?;

        let merged = match existing {
            Some(payload) => {
                let mut stored = Self::decode_entity(&payload)?;
                stored.merge_from(entity);
                stored
            }
            None => entity.clone(),
        };

        tx.execute(
            "INSERT INTO entities (id, entity_type, article_url, confidence, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                entity_type = excluded.entity_type,
                article_url = excluded.article_url,
                confidence = excluded.confidence,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                merged.id,
                merged.entity_type.as_str(),
                merged.article_url,
                merged.confidence,
                serde_json::to_string(&merged)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(entity.id.clone())
    }

    async fn upsert_relation(&self, relation: &Relation) -> GraphloomResult<RelationId> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT payload FROM relations WHERE id = ?1",
                params![relation.id],
                |row| row.get(0),
            )
            .optional()?;

        let merged = match existing {
            Some(payload) => {
                let mut stored: Relation = serde_json::from_str(&payload)?;
                stored.merge_from(relation);
                stored
            }
            None => relation.clone(),
        };

        tx.execute(
            "INSERT INTO relations (id, subject_id, object_id, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                merged.id,
                merged.subject_id,
                merged.object_id,
                serde_json::to_string(&merged)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(relation.id.clone())
    }

    async fn upsert_article(&self, article: &ArticleRecord) -> GraphloomResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT payload FROM articles WHERE url = ?1",
                params![article.url],
                |row| row.get(0),
            )
            .optional()?;

        let merged = match existing {
            Some(payload) => {
                let mut stored: ArticleRecord = serde_json::from_str(&payload)?;
                merge_article(&mut stored, article);
                stored
            }
            None => article.clone(),
        };

        tx.execute(
            "INSERT INTO articles (url, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(url) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![
                merged.url,
                serde_json::to_string(&merged)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn get_entity(&self, id: &str) -> GraphloomResult<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM entities WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload.map(|p| Self::decode_entity(&p)).transpose()
    }

    async fn get_article(&self, url: &str) -> GraphloomResult<Option<ArticleRecord>> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM articles WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }

    async fn get_entities_by_article(&self, article_url: &str) -> GraphloomResult<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT payload FROM entities WHERE article_url = ?1 ORDER BY id")?;
        let payloads = stmt
            .query_map(params![article_url], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads.iter().map(|p| Self::decode_entity(p)).collect()
    }

    async fn query_by_type(&self, entity_type: EntityType) -> GraphloomResult<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT payload FROM entities WHERE entity_type = ?1 ORDER BY id")?;
        let payloads = stmt
            .query_map(params![entity_type.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads.iter().map(|p| Self::decode_entity(p)).collect()
    }

    async fn get_relations_for_entity(&self, entity_id: &str) -> GraphloomResult<Vec<Relation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM relations WHERE subject_id = ?1 OR object_id = ?1 ORDER BY id",
        )?;
        let payloads = stmt
            .query_map(params![entity_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads
            .iter()
            .map(|p| Ok(serde_json::from_str(p)?))
            .collect()
    }

    async fn stats(&self) -> GraphloomResult<GraphStats> {
        let conn = self.conn.lock().unwrap();
        let mut stats = GraphStats {
            entity_count: conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?,
            relation_count: conn.query_row("SELECT COUNT(*) FROM relations", [], |r| r.get(0))?,
            article_count: conn.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get(0))?,
            ..Default::default()
        };

        let mut stmt =
            conn.prepare("SELECT entity_type, COUNT(*) FROM entities GROUP BY entity_type")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (entity_type, count) in rows {
            stats.entities_by_type.insert(entity_type, count);
        }
        Ok(stats)
    }

    async fn snapshot(&self, limit: usize) -> GraphloomResult<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT payload FROM entities ORDER BY confidence DESC, id ASC LIMIT ?1",
        )?;
        let payloads = stmt
            .query_map(params![limit], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        payloads.iter().map(|p| Self::decode_entity(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphloom_core::entity_id;
    use std::collections::BTreeSet;

    fn entity(name: &str, entity_type: EntityType, confidence: f64) -> Entity {
        Entity {
            id: entity_id("global", entity_type, &name.to_lowercase()),
            canonical_name: name.to_string(),
            entity_type,
            aliases: BTreeSet::from([name.to_string()]),
            confidence,
            article_url: Some("https://example.org/a1".to_string()),
            source_chunk_ids: BTreeSet::from(["chunk-1".to_string()]),
        }
    }

    #[tokio::test]
    async fn test_upsert_merges_instead_of_duplicating() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let first = entity("Acme", EntityType::Organization, 0.6);
        let mut second = first.clone();
        second.aliases.insert("Acme Inc".to_string());
        second.confidence = 0.95;

        store.upsert_entity(&first).await.unwrap();
        store.upsert_entity(&second).await.unwrap();

        let stored = store.get_entity(&first.id).await.unwrap().unwrap();
        assert_eq!(stored.confidence, 0.95);
        assert!(stored.aliases.contains("Acme Inc"));
        assert_eq!(store.stats().await.unwrap().entity_count, 1);
    }

    #[tokio::test]
    async fn test_relation_queries_both_directions() {
        let store = SqliteGraphStore::in_memory().unwrap();
        let relation = Relation {
            id: "rel-1".to_string(),
            subject_id: "ent-a".to_string(),
            predicate: "WORKS_FOR".to_string(),
            object_id: "ent-b".to_string(),
            confidence: 0.8,
            article_url: None,
        };
        store.upsert_relation(&relation).await.unwrap();

        assert_eq!(
            store.get_relations_for_entity("ent-a").await.unwrap().len(),
            1
        );
        assert_eq!(
            store.get_relations_for_entity("ent-b").await.unwrap().len(),
            1
        );
        assert!(store
            .get_relations_for_entity("ent-c")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_snapshot() {
        let store = SqliteGraphStore::in_memory().unwrap();
        store
            .upsert_entity(&entity("Acme", EntityType::Organization, 0.9))
            .await
            .unwrap();
        store
            .upsert_entity(&entity("Alice", EntityType::Person, 0.7))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.entities_by_type["ORGANIZATION"], 1);
        assert_eq!(stats.entities_by_type["PERSON"], 1);

        let top = store.snapshot(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].canonical_name, "Acme");
    }

    #[tokio::test]
    async fn test_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let e = entity("Acme", EntityType::Organization, 0.9);
        {
            let store = SqliteGraphStore::new(&path).unwrap();
            store.upsert_entity(&e).await.unwrap();
        }
        let reopened = SqliteGraphStore::new(&path).unwrap();
        assert!(reopened.get_entity(&e.id).await.unwrap().is_some());
    }
}
