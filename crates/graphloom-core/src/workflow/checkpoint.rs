//! Checkpoint persistence for workflows.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{GraphloomError, GraphloomResult};

use super::step::WorkflowSnapshot;

/// Trait for workflow checkpoint storage.
///
/// Implementations must make `save` atomic per workflow: a crash
/// between two saves leaves the previous snapshot intact, never a torn
/// one.
pub trait CheckpointStore: Send + Sync {
    /// Write (or replace) the snapshot for a workflow.
    fn save(&self, snapshot: &WorkflowSnapshot) -> GraphloomResult<()>;

    /// Load the latest snapshot, if one exists.
    fn load(&self, workflow_id: &str) -> GraphloomResult<Option<WorkflowSnapshot>>;

    /// Remove a workflow's checkpoint.
    fn delete(&self, workflow_id: &str) -> GraphloomResult<()>;

    /// Ids of all checkpointed workflows.
    fn list(&self) -> GraphloomResult<Vec<String>>;
}

/// SQLite-backed checkpoint store. The snapshot is stored as one JSON
/// document per workflow row.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Create a new store at the given path.
    pub fn new(path: impl AsRef<Path>) -> GraphloomResult<Self> {
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
            CREATE TABLE IF NOT EXISTS workflows (
                workflow_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);
        "#,
        )?;
        Ok(())
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, snapshot: &WorkflowSnapshot) -> GraphloomResult<()> {
        let json = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO workflows (workflow_id, status, snapshot, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(workflow_id) DO UPDATE SET
                status = excluded.status,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at",
            params![
                snapshot.workflow_id,
                snapshot.status.as_str(),
                json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load(&self, workflow_id: &str) -> GraphloomResult<Option<WorkflowSnapshot>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM workflows WHERE workflow_id = ?1",
                params![workflow_id],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => {
                let snapshot = serde_json::from_str(&json).map_err(|e| {
                    GraphloomError::checkpoint(format!(
                        "corrupt snapshot for workflow {workflow_id}: {e}"
                    ))
                })?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn delete(&self, workflow_id: &str) -> GraphloomResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM workflows WHERE workflow_id = ?1",
            params![workflow_id],
        )?;
        Ok(())
    }

    fn list(&self) -> GraphloomResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT workflow_id FROM workflows ORDER BY workflow_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

/// In-memory checkpoint store for tests and ephemeral workflows.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    snapshots: Mutex<HashMap<String, WorkflowSnapshot>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn save(&self, snapshot: &WorkflowSnapshot) -> GraphloomResult<()> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.workflow_id.clone(), snapshot.clone());
        Ok(())
    }

    fn load(&self, workflow_id: &str) -> GraphloomResult<Option<WorkflowSnapshot>> {
        Ok(self.snapshots.lock().unwrap().get(workflow_id).cloned())
    }

    fn delete(&self, workflow_id: &str) -> GraphloomResult<()> {
        self.snapshots.lock().unwrap().remove(workflow_id);
        Ok(())
    }

    fn list(&self) -> GraphloomResult<Vec<String>> {
        let mut ids: Vec<String> = self.snapshots.lock().unwrap().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
