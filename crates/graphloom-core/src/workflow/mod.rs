//! Resumable, checkpointed workflows.

mod checkpoint;
mod engine;
mod step;

pub use checkpoint::{CheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};
pub use engine::{StepContext, WorkflowEngine};
pub use step::{
    Confirmation, StepOutcome, StepStatus, WorkflowOutcome, WorkflowSnapshot, WorkflowStatus,
    WorkflowStep,
};
