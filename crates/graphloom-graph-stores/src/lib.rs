//! graphloom-graph-stores - Graph store backends for graphloom.
//!
//! Implementations of the `GraphStore` trait: an in-memory reference
//! backend and a durable SQLite document store, plus a factory that
//! builds either from configuration.

pub mod factory;
pub mod memory;
pub mod sqlite;

pub use factory::GraphStoreFactory;
pub use memory::InMemoryGraphStore;
pub use sqlite::SqliteGraphStore;
