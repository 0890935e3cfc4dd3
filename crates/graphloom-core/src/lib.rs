//! graphloom-core - Core library for graphloom.
//!
//! This crate provides the types, traits, resolver, pipeline
//! orchestrator and workflow engine for building knowledge graphs from
//! article text via an external extraction oracle.
//!
//! # Example
//!
//! ```ignore
//! use graphloom_core::{ArticleMeta, Chunk, GraphloomConfig, PipelineOrchestrator};
//!
//! let config = GraphloomConfig::default();
//! let orchestrator = PipelineOrchestrator::new(&config, oracle, graph_store);
//!
//! let article = ArticleMeta::new("article-1").url("https://example.org/a1");
//! let chunks = vec![Chunk::new("article-1", 0, "Tim Cook leads Apple.")];
//!
//! let run_id = orchestrator.submit(article, chunks).await?;
//! let result = orchestrator.await_run(&run_id, Duration::from_secs(120)).await?;
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod scratch;
pub mod traits;
pub mod types;
pub mod workflow;

// Re-export commonly used types
pub use config::{GraphloomConfig, MergeScope, PipelineConfig, RetryConfig, WorkflowConfig};
pub use error::{ErrorCode, GraphloomError, GraphloomResult};
pub use pipeline::{
    ArticleMeta, ChunkFailure, PipelineOrchestrator, RunManifest, RunResult, RunStatus, RunSummary,
    TopEntity,
};
pub use resolver::{
    normalization_key, normalize_predicate, DropReason, DroppedRelation, EntityResolver,
    MergeConfig, Resolution, TypeConflict,
};
pub use scratch::ScratchStore;
pub use traits::{
    ConfirmationChannel, ExtractionContext, ExtractionOracle, GraphStore, GraphStoreConfig,
    GraphStoreProvider,
};
pub use types::{
    entity_id, relation_id, ArticleRecord, CandidateEntity, CandidateRelation, Chunk, Entity,
    EntityId, EntityType, Extraction, GraphStats, Relation, RelationId, GLOBAL_SCOPE,
};
pub use workflow::{
    CheckpointStore, Confirmation, InMemoryCheckpointStore, SqliteCheckpointStore, StepContext,
    StepOutcome, StepStatus, WorkflowEngine, WorkflowOutcome, WorkflowSnapshot, WorkflowStatus,
    WorkflowStep,
};
