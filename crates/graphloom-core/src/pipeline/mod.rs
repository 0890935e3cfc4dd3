//! Pipeline orchestration.

mod orchestrator;
mod run;

pub use orchestrator::PipelineOrchestrator;
pub use run::{
    ArticleMeta, ChunkFailure, RunManifest, RunResult, RunStatus, RunSummary, TopEntity,
};
