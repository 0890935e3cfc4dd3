//! Service traits at the system's seams.
//!
//! The extraction oracle, graph storage backend, and confirmation
//! channel are external collaborators; each is specified here purely by
//! its interface so backends are interchangeable and fakeable in tests.

mod confirmation;
mod graph_store;
mod oracle;

pub use confirmation::ConfirmationChannel;
pub use graph_store::{GraphStore, GraphStoreConfig, GraphStoreProvider};
pub use oracle::{ExtractionContext, ExtractionOracle};
