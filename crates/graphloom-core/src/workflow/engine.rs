//! Resumable workflow engine.
//!
//! A workflow is an ordered list of named steps with dependencies. The
//! engine checkpoints the full snapshot after every step transition,
//! so a crashed or restarted process re-runs `run()` and continues
//! from the first non-succeeded step. Steps may pause for human
//! confirmation; the pause itself is checkpointed, and `resume()`
//! injects the decision in a fresh process.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::WorkflowConfig;
use crate::error::{ErrorCode, GraphloomError, GraphloomResult};
use crate::traits::ConfirmationChannel;

use super::checkpoint::CheckpointStore;
use super::step::{
    Confirmation, StepOutcome, StepStatus, WorkflowOutcome, WorkflowSnapshot, WorkflowStatus,
    WorkflowStep,
};

/// Read-only view a step body receives.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workflow_id: String,
    /// Shared workflow state. Succeeded steps' outputs appear here
    /// under their step id.
    pub state: BTreeMap<String, Value>,
}

impl StepContext {
    /// Output of an earlier step, if it succeeded.
    pub fn output_of(&self, step_id: &str) -> Option<&Value> {
        self.state.get(step_id)
    }
}

type StepFn =
    Arc<dyn Fn(StepContext) -> BoxFuture<'static, GraphloomResult<StepOutcome>> + Send + Sync>;

struct StepDef {
    id: String,
    depends_on: Vec<String>,
    handler: StepFn,
}

/// Checkpointed workflow executor.
pub struct WorkflowEngine {
    workflow_id: String,
    steps: Vec<StepDef>,
    checkpoint: Arc<dyn CheckpointStore>,
    confirmation: Option<Arc<dyn ConfirmationChannel>>,
    config: WorkflowConfig,
}

impl WorkflowEngine {
    pub fn new(workflow_id: impl Into<String>, checkpoint: Arc<dyn CheckpointStore>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            steps: Vec::new(),
            checkpoint,
            confirmation: None,
            config: WorkflowConfig::default(),
        }
    }

    /// Attach the channel used to notify a human when a step pauses.
    pub fn with_confirmation(mut self, channel: Arc<dyn ConfirmationChannel>) -> Self {
        self.confirmation = Some(channel);
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a step. Steps run in registration order, gated on their
    /// dependencies having succeeded.
    pub fn step<F, Fut>(mut self, id: impl Into<String>, depends_on: &[&str], handler: F) -> Self
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = GraphloomResult<StepOutcome>> + Send + 'static,
    {
        self.steps.push(StepDef {
            id: id.into(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            handler: Arc::new(move |ctx| Box::pin(handler(ctx))),
        });
        self
    }

    /// Run the workflow from its checkpoint, or from scratch if none
    /// exists. Succeeded steps are never re-run.
    pub async fn run(&self) -> GraphloomResult<WorkflowOutcome> {
        let mut snapshot = match self.checkpoint.load(&self.workflow_id)? {
            Some(mut snapshot) => {
                self.reconcile(&snapshot)?;
                // A step still marked running was interrupted mid-flight
                // by a crash; it never checkpointed an outcome, so it
                // goes back to pending and re-executes.
                for step in &mut snapshot.steps {
                    if step.status == StepStatus::Running {
                        info!(
                            workflow_id = %self.workflow_id,
                            step_id = %step.id,
                            "step was interrupted while running, scheduling re-execution"
                        );
                        step.status = StepStatus::Pending;
                    }
                }
                snapshot
            }
            None => self.fresh_snapshot(),
        };

        match snapshot.status {
            WorkflowStatus::Completed => return Ok(WorkflowOutcome::Completed(snapshot)),
            WorkflowStatus::Failed => {
                let step = snapshot
                    .steps
                    .iter()
                    .find(|s| s.status == StepStatus::Failed)
                    .cloned();
                let (step_id, error) = step
                    .map(|s| (s.id, s.error.unwrap_or_default()))
                    .unwrap_or_default();
                return Ok(WorkflowOutcome::Failed {
                    step_id,
                    error,
                    snapshot,
                });
            }
            WorkflowStatus::Cancelled => {
                return Err(GraphloomError::workflow(
                    format!("workflow {} was cancelled", self.workflow_id),
                    ErrorCode::WflCancelled,
                ));
            }
            WorkflowStatus::Paused => {
                // Already waiting on a human; report the pause again
                // rather than re-running anything.
                if let Some(step) = snapshot.paused_step() {
                    let step_id = step.id.clone();
                    let prompt = step.prompt.clone().unwrap_or_default();
                    return Ok(WorkflowOutcome::Paused {
                        step_id,
                        prompt,
                        snapshot,
                    });
                }
            }
            WorkflowStatus::Pending | WorkflowStatus::Running => {}
        }

        snapshot.status = WorkflowStatus::Running;
        self.save(&mut snapshot)?;
        self.advance(snapshot).await
    }

    /// Resume a paused workflow with a human decision.
    pub async fn resume(&self, confirmation: Confirmation) -> GraphloomResult<WorkflowOutcome> {
        let mut snapshot = self.checkpoint.load(&self.workflow_id)?.ok_or_else(|| {
            GraphloomError::Checkpoint {
                message: format!("no checkpoint for workflow {}", self.workflow_id),
                code: ErrorCode::CkpNotFound,
                source: None,
            }
        })?;
        self.reconcile(&snapshot)?;

        if snapshot.status != WorkflowStatus::Paused {
            return Err(GraphloomError::workflow(
                format!(
                    "workflow {} is {}, not paused",
                    self.workflow_id, snapshot.status
                ),
                ErrorCode::WflNotResumable,
            ));
        }
        let step_id = snapshot
            .paused_step()
            .map(|s| s.id.clone())
            .ok_or_else(|| {
                GraphloomError::workflow(
                    "paused workflow has no paused step",
                    ErrorCode::WflNotResumable,
                )
            })?;

        if let Some(deadline_secs) = self.config.confirmation_deadline_secs {
            let paused_at = snapshot.step(&step_id).and_then(|s| s.paused_at);
            let expired = paused_at.is_some_and(|at| {
                Utc::now() - at > Duration::seconds(deadline_secs as i64)
            });
            if expired {
                return self.fail_step(
                    snapshot,
                    &step_id,
                    format!("confirmation deadline of {deadline_secs}s expired"),
                );
            }
        }

        if !confirmation.approved {
            return self.fail_step(snapshot, &step_id, "confirmation rejected".to_string());
        }

        info!(workflow_id = %self.workflow_id, step_id = %step_id, "confirmation approved, resuming");
        let output = confirmation
            .payload
            .clone()
            .unwrap_or_else(|| json!({ "approved": true }));
        {
            let step = snapshot
                .step_mut(&step_id)
                .ok_or_else(|| GraphloomError::workflow_step("paused step vanished", &step_id))?;
            step.status = StepStatus::Succeeded;
            step.output = Some(output.clone());
            step.prompt = None;
            step.paused_at = None;
        }
        snapshot.state.insert(step_id.clone(), output);
        if let Some(payload) = confirmation.payload {
            snapshot
                .state
                .insert(format!("confirmation:{step_id}"), payload);
        }
        snapshot.status = WorkflowStatus::Running;
        self.save(&mut snapshot)?;

        self.advance(snapshot).await
    }

    /// Cancel a workflow: every step that has not reached a terminal
    /// state fails with the reason, and the workflow ends `Cancelled`.
    pub async fn cancel(&self, reason: &str) -> GraphloomResult<WorkflowSnapshot> {
        let mut snapshot = self.checkpoint.load(&self.workflow_id)?.ok_or_else(|| {
            GraphloomError::Checkpoint {
                message: format!("no checkpoint for workflow {}", self.workflow_id),
                code: ErrorCode::CkpNotFound,
                source: None,
            }
        })?;
        if snapshot.status.is_terminal() {
            return Err(GraphloomError::workflow(
                format!(
                    "workflow {} is already {}",
                    self.workflow_id, snapshot.status
                ),
                ErrorCode::WflNotResumable,
            ));
        }

        for step in &mut snapshot.steps {
            if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
                step.status = StepStatus::Failed;
                step.error = Some(format!("cancelled: {reason}"));
            }
        }
        snapshot.status = WorkflowStatus::Cancelled;
        self.save(&mut snapshot)?;
        info!(workflow_id = %self.workflow_id, reason, "workflow cancelled");
        Ok(snapshot)
    }

    /// Latest checkpointed snapshot, if any.
    pub fn snapshot(&self) -> GraphloomResult<Option<WorkflowSnapshot>> {
        self.checkpoint.load(&self.workflow_id)
    }

    fn fresh_snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.workflow_id.clone(),
            status: WorkflowStatus::Pending,
            steps: self
                .steps
                .iter()
                .map(|def| WorkflowStep::new(def.id.clone(), def.depends_on.clone()))
                .collect(),
            state: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// A loaded checkpoint must describe the same steps as the current
    /// definition; anything else means the caller is resuming with the
    /// wrong workflow.
    fn reconcile(&self, snapshot: &WorkflowSnapshot) -> GraphloomResult<()> {
        let defined: Vec<&str> = self.steps.iter().map(|d| d.id.as_str()).collect();
        let checkpointed: Vec<&str> = snapshot.steps.iter().map(|s| s.id.as_str()).collect();
        if defined != checkpointed {
            return Err(GraphloomError::workflow(
                format!(
                    "checkpoint for {} does not match the step definition",
                    self.workflow_id
                ),
                ErrorCode::WflNotResumable,
            ));
        }
        Ok(())
    }

    fn save(&self, snapshot: &mut WorkflowSnapshot) -> GraphloomResult<()> {
        snapshot.updated_at = Utc::now();
        self.checkpoint.save(snapshot)
    }

    fn fail_step(
        &self,
        mut snapshot: WorkflowSnapshot,
        step_id: &str,
        error: String,
    ) -> GraphloomResult<WorkflowOutcome> {
        warn!(workflow_id = %self.workflow_id, step_id, error = %error, "step failed");
        if let Some(step) = snapshot.step_mut(step_id) {
            step.status = StepStatus::Failed;
            step.error = Some(error.clone());
            step.paused_at = None;
        }
        snapshot.status = WorkflowStatus::Failed;
        self.save(&mut snapshot)?;
        Ok(WorkflowOutcome::Failed {
            step_id: step_id.to_string(),
            error,
            snapshot,
        })
    }

    /// Run every runnable step to a pause, failure, or completion.
    async fn advance(&self, mut snapshot: WorkflowSnapshot) -> GraphloomResult<WorkflowOutcome> {
        loop {
            let Some(def) = self.next_runnable(&snapshot) else {
                break;
            };
            let step_id = def.id.clone();

            snapshot
                .step_mut(&step_id)
                .ok_or_else(|| GraphloomError::workflow_step("unknown step", &step_id))?
                .status = StepStatus::Running;
            self.save(&mut snapshot)?;
            info!(workflow_id = %self.workflow_id, step_id = %step_id, "step running");

            let ctx = StepContext {
                workflow_id: self.workflow_id.clone(),
                state: snapshot.state.clone(),
            };
            match (def.handler)(ctx).await {
                Ok(StepOutcome::Complete(output)) => {
                    let step = snapshot
                        .step_mut(&step_id)
                        .ok_or_else(|| GraphloomError::workflow_step("unknown step", &step_id))?;
                    step.status = StepStatus::Succeeded;
                    step.output = Some(output.clone());
                    snapshot.state.insert(step_id.clone(), output);
                    self.save(&mut snapshot)?;
                    info!(workflow_id = %self.workflow_id, step_id = %step_id, "step succeeded");
                }
                Ok(StepOutcome::AwaitConfirmation { prompt }) => {
                    {
                        let step = snapshot.step_mut(&step_id).ok_or_else(|| {
                            GraphloomError::workflow_step("unknown step", &step_id)
                        })?;
                        step.status = StepStatus::Paused;
                        step.prompt = Some(prompt.clone());
                        step.paused_at = Some(Utc::now());
                    }
                    snapshot.status = WorkflowStatus::Paused;
                    // Checkpoint before notifying: the pause must
                    // survive even if the notification fails.
                    self.save(&mut snapshot)?;
                    if let Some(channel) = &self.confirmation {
                        if let Err(e) = channel
                            .request_confirmation(&self.workflow_id, &step_id, &prompt)
                            .await
                        {
                            warn!(
                                workflow_id = %self.workflow_id,
                                step_id = %step_id,
                                error = %e,
                                "confirmation request failed; workflow stays paused"
                            );
                        }
                    }
                    info!(workflow_id = %self.workflow_id, step_id = %step_id, "workflow paused");
                    return Ok(WorkflowOutcome::Paused {
                        step_id,
                        prompt,
                        snapshot,
                    });
                }
                Err(e) => {
                    return self.fail_step(snapshot, &step_id, e.to_string());
                }
            }
        }

        let all_done = snapshot
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Succeeded);
        if all_done {
            snapshot.status = WorkflowStatus::Completed;
            self.save(&mut snapshot)?;
            info!(workflow_id = %self.workflow_id, "workflow completed");
            return Ok(WorkflowOutcome::Completed(snapshot));
        }

        // No runnable step and not everything succeeded: a dependency
        // can never be satisfied.
        Err(GraphloomError::workflow(
            format!(
                "workflow {} has unsatisfiable step dependencies",
                self.workflow_id
            ),
            ErrorCode::WflStepFailed,
        ))
    }

    /// First pending step whose dependencies have all succeeded.
    fn next_runnable(&self, snapshot: &WorkflowSnapshot) -> Option<&StepDef> {
        self.steps.iter().find(|def| {
            let pending = snapshot
                .step(&def.id)
                .map(|s| s.status == StepStatus::Pending)
                .unwrap_or(false);
            pending
                && def.depends_on.iter().all(|dep| {
                    snapshot
                        .step(dep)
                        .map(|s| s.status == StepStatus::Succeeded)
                        .unwrap_or(false)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::checkpoint::InMemoryCheckpointStore;

    fn store() -> Arc<InMemoryCheckpointStore> {
        Arc::new(InMemoryCheckpointStore::new())
    }

    #[tokio::test]
    async fn test_linear_workflow_completes() {
        let engine = WorkflowEngine::new("wf-1", store())
            .step("first", &[], |_ctx| async {
                Ok(StepOutcome::Complete(json!(1)))
            })
            .step("second", &["first"], |ctx| {
                let prev = ctx.output_of("first").cloned();
                async move {
                    assert_eq!(prev, Some(json!(1)));
                    Ok(StepOutcome::Complete(json!(2)))
                }
            });

        match engine.run().await.unwrap() {
            WorkflowOutcome::Completed(snapshot) => {
                assert_eq!(snapshot.status, WorkflowStatus::Completed);
                assert_eq!(snapshot.state["second"], json!(2));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_step_fails_workflow() {
        let engine = WorkflowEngine::new("wf-1", store())
            .step("boom", &[], |_ctx| async {
                Err(GraphloomError::workflow_step("did not work", "boom"))
            })
            .step("never", &["boom"], |_ctx| async {
                Ok(StepOutcome::Complete(json!(null)))
            });

        match engine.run().await.unwrap() {
            WorkflowOutcome::Failed {
                step_id, snapshot, ..
            } => {
                assert_eq!(step_id, "boom");
                assert_eq!(
                    snapshot.step("never").unwrap().status,
                    StepStatus::Pending
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_fails_non_terminal_steps() {
        let checkpoint = store();
        let engine = WorkflowEngine::new("wf-1", Arc::clone(&checkpoint) as Arc<dyn CheckpointStore>)
            .step("first", &[], |_ctx| async {
                Ok(StepOutcome::Complete(json!(1)))
            })
            .step("gate", &["first"], |_ctx| async {
                Ok(StepOutcome::AwaitConfirmation {
                    prompt: "continue?".into(),
                })
            })
            .step("last", &["gate"], |_ctx| async {
                Ok(StepOutcome::Complete(json!(3)))
            });

        engine.run().await.unwrap();
        let snapshot = engine.cancel("operator abort").await.unwrap();

        assert_eq!(snapshot.status, WorkflowStatus::Cancelled);
        assert_eq!(snapshot.step("first").unwrap().status, StepStatus::Succeeded);
        // The paused gate keeps its pause; the pending tail fails.
        assert_eq!(snapshot.step("gate").unwrap().status, StepStatus::Paused);
        let last = snapshot.step("last").unwrap();
        assert_eq!(last.status, StepStatus::Failed);
        assert!(last.error.as_deref().unwrap().contains("operator abort"));

        // A cancelled workflow cannot be resumed.
        assert!(engine.resume(Confirmation::approve()).await.is_err());
    }
}
