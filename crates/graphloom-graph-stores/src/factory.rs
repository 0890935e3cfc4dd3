//! Factory for creating graph store backends.

use std::path::Path;
use std::sync::Arc;

use graphloom_core::{GraphStore, GraphStoreConfig, GraphStoreProvider, GraphloomError, GraphloomResult};

use crate::memory::InMemoryGraphStore;
use crate::sqlite::SqliteGraphStore;

/// Factory for creating graph store backends.
pub struct GraphStoreFactory;

impl GraphStoreFactory {
    /// Create a graph store from the given configuration.
    pub fn create(config: &GraphStoreConfig) -> GraphloomResult<Arc<dyn GraphStore>> {
        match config.provider {
            GraphStoreProvider::InMemory => Ok(Arc::new(InMemoryGraphStore::new())),
            GraphStoreProvider::Sqlite => {
                let path = config.path.as_ref().ok_or_else(|| {
                    GraphloomError::Configuration(
                        "sqlite graph store requires a database path".to_string(),
                    )
                })?;
                Ok(Arc::new(SqliteGraphStore::new(path)?))
            }
        }
    }

    /// Create an in-memory store with default configuration.
    pub fn in_memory() -> Arc<dyn GraphStore> {
        Arc::new(InMemoryGraphStore::new())
    }

    /// Create a SQLite store at the given path.
    pub fn sqlite(path: impl AsRef<Path>) -> GraphloomResult<Arc<dyn GraphStore>> {
        Ok(Arc::new(SqliteGraphStore::new(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_in_memory() {
        let config = GraphStoreConfig::default();
        assert!(GraphStoreFactory::create(&config).is_ok());
    }

    #[test]
    fn test_sqlite_without_path_is_an_error() {
        let config = GraphStoreConfig {
            provider: GraphStoreProvider::Sqlite,
            path: None,
        };
        assert!(GraphStoreFactory::create(&config).is_err());
    }

    #[test]
    fn test_create_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = GraphStoreConfig {
            provider: GraphStoreProvider::Sqlite,
            path: Some(dir.path().join("graph.db")),
        };
        assert!(GraphStoreFactory::create(&config).is_ok());
    }
}
