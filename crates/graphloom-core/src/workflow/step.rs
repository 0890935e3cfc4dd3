//! Workflow step and snapshot types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Step state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Waiting on a human confirmation.
    Paused,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One step in a workflow definition, with its persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    /// Ids of steps that must succeed before this one runs.
    pub depends_on: Vec<String>,
    pub status: StepStatus,
    /// Failure or cancellation reason when `status` is `Failed`.
    pub error: Option<String>,
    /// Output recorded on success, available to later steps.
    pub output: Option<Value>,
    /// Confirmation prompt when `status` is `Paused`.
    pub prompt: Option<String>,
    /// When the step paused, for confirmation-deadline checks.
    pub paused_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, depends_on: Vec<String>) -> Self {
        Self {
            id: id.into(),
            depends_on,
            status: StepStatus::Pending,
            error: None,
            output: None,
            prompt: None,
            paused_at: None,
        }
    }
}

/// What a step body returns.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The step finished; its output is checkpointed.
    Complete(Value),
    /// The step needs a human decision before it can finish. The
    /// workflow pauses here and survives process restarts.
    AwaitConfirmation { prompt: String },
}

/// Workflow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The full persisted state of one workflow, written to the checkpoint
/// store after every step transition. Loading a snapshot and re-running
/// the same definition continues exactly where the last process left
/// off, without re-running succeeded steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    /// Steps in definition order.
    pub steps: Vec<WorkflowStep>,
    /// Shared state steps read and write, keyed by name.
    pub state: BTreeMap<String, Value>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub(crate) fn step_mut(&mut self, id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// The paused step, if the workflow is waiting on confirmation.
    pub fn paused_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Paused)
    }
}

/// A human decision injected when resuming a paused workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub approved: bool,
    /// Optional payload made visible to the resumed step's successors
    /// under the `confirmation:<step_id>` state key.
    pub payload: Option<Value>,
}

impl Confirmation {
    pub fn approve() -> Self {
        Self {
            approved: true,
            payload: None,
        }
    }

    pub fn approve_with(payload: Value) -> Self {
        Self {
            approved: true,
            payload: Some(payload),
        }
    }

    pub fn reject() -> Self {
        Self {
            approved: false,
            payload: None,
        }
    }
}

/// How one engine invocation ended.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Completed(WorkflowSnapshot),
    /// Paused awaiting confirmation for `step_id`. State is already
    /// checkpointed; the process may exit.
    Paused {
        step_id: String,
        prompt: String,
        snapshot: WorkflowSnapshot,
    },
    Failed {
        step_id: String,
        error: String,
        snapshot: WorkflowSnapshot,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_terminal() {
        assert!(StepStatus::Succeeded.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Paused.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
    }

    #[test]
    fn test_snapshot_paused_step_lookup() {
        let mut snapshot = WorkflowSnapshot {
            workflow_id: "wf-1".into(),
            status: WorkflowStatus::Paused,
            steps: vec![
                WorkflowStep::new("extract", vec![]),
                WorkflowStep::new("confirm", vec!["extract".into()]),
            ],
            state: BTreeMap::new(),
            updated_at: Utc::now(),
        };
        snapshot.step_mut("confirm").unwrap().status = StepStatus::Paused;

        assert_eq!(snapshot.paused_step().unwrap().id, "confirm");
        assert!(snapshot.step("missing").is_none());
    }
}
