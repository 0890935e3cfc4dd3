//! Workflow engine integration tests: resumability, confirmation
//! gates, and cancellation against real checkpoint stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use graphloom_core::{
    CheckpointStore, Confirmation, ConfirmationChannel, GraphloomError, GraphloomResult,
    InMemoryCheckpointStore, SqliteCheckpointStore, StepOutcome, StepStatus, WorkflowConfig,
    WorkflowEngine, WorkflowOutcome, WorkflowSnapshot, WorkflowStatus, WorkflowStep,
};

/// Records confirmation requests instead of reaching a human.
#[derive(Default)]
struct RecordingChannel {
    requests: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl ConfirmationChannel for RecordingChannel {
    async fn request_confirmation(
        &self,
        workflow_id: &str,
        step_id: &str,
        prompt: &str,
    ) -> GraphloomResult<()> {
        self.requests.lock().unwrap().push((
            workflow_id.to_string(),
            step_id.to_string(),
            prompt.to_string(),
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_resume_skips_succeeded_steps() {
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let first_runs = Arc::new(AtomicUsize::new(0));
    let second_runs = Arc::new(AtomicUsize::new(0));

    // First attempt: step two fails.
    {
        let first_runs = Arc::clone(&first_runs);
        let second_runs = Arc::clone(&second_runs);
        let engine = WorkflowEngine::new("wf-1", Arc::clone(&checkpoint))
            .step("extract", &[], move |_ctx| {
                first_runs.fetch_add(1, Ordering::SeqCst);
                async { Ok(StepOutcome::Complete(json!("extracted"))) }
            })
            .step("persist", &["extract"], move |_ctx| {
                second_runs.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(GraphloomError::workflow_step(
                        "store unreachable",
                        "persist",
                    ))
                }
            });
        match engine.run().await.unwrap() {
            WorkflowOutcome::Failed { step_id, .. } => assert_eq!(step_id, "persist"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    // The operator resets the failed step and a new process retries.
    {
        let mut snapshot = checkpoint.load("wf-1").unwrap().unwrap();
        let step = snapshot
            .steps
            .iter_mut()
            .find(|s| s.id == "persist")
            .unwrap();
        step.status = StepStatus::Pending;
        step.error = None;
        snapshot.status = WorkflowStatus::Running;
        checkpoint.save(&snapshot).unwrap();
    }

    {
        let first_runs = Arc::clone(&first_runs);
        let second_runs = Arc::clone(&second_runs);
        let engine = WorkflowEngine::new("wf-1", Arc::clone(&checkpoint))
            .step("extract", &[], move |_ctx| {
                first_runs.fetch_add(1, Ordering::SeqCst);
                async { Ok(StepOutcome::Complete(json!("extracted"))) }
            })
            .step("persist", &["extract"], move |ctx| {
                second_runs.fetch_add(1, Ordering::SeqCst);
                let upstream = ctx.output_of("extract").cloned();
                async move {
                    // Output of the first attempt's run survives in state.
                    assert_eq!(upstream, Some(json!("extracted")));
                    Ok(StepOutcome::Complete(json!("persisted")))
                }
            });
        match engine.run().await.unwrap() {
            WorkflowOutcome::Completed(snapshot) => {
                assert_eq!(snapshot.status, WorkflowStatus::Completed);
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    // The succeeded step never re-ran.
    assert_eq!(first_runs.load(Ordering::SeqCst), 1);
    assert_eq!(second_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_step_interrupted_while_running_is_re_executed() {
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let first_runs = Arc::new(AtomicUsize::new(0));
    let second_runs = Arc::new(AtomicUsize::new(0));

    // The previous process checkpointed "persist" as running and died
    // before recording an outcome.
    {
        let mut extract = WorkflowStep::new("extract", vec![]);
        extract.status = StepStatus::Succeeded;
        extract.output = Some(json!("extracted"));
        let mut persist = WorkflowStep::new("persist", vec!["extract".into()]);
        persist.status = StepStatus::Running;

        let mut state = std::collections::BTreeMap::new();
        state.insert("extract".to_string(), json!("extracted"));
        checkpoint
            .save(&WorkflowSnapshot {
                workflow_id: "wf-crash".into(),
                status: WorkflowStatus::Running,
                steps: vec![extract, persist],
                state,
                updated_at: chrono::Utc::now(),
            })
            .unwrap();
    }

    let engine = {
        let first_runs = Arc::clone(&first_runs);
        let second_runs = Arc::clone(&second_runs);
        WorkflowEngine::new("wf-crash", Arc::clone(&checkpoint))
            .step("extract", &[], move |_ctx| {
                first_runs.fetch_add(1, Ordering::SeqCst);
                async { Ok(StepOutcome::Complete(json!("extracted"))) }
            })
            .step("persist", &["extract"], move |ctx| {
                second_runs.fetch_add(1, Ordering::SeqCst);
                let upstream = ctx.output_of("extract").cloned();
                async move {
                    assert_eq!(upstream, Some(json!("extracted")));
                    Ok(StepOutcome::Complete(json!("persisted")))
                }
            })
    };

    match engine.run().await.unwrap() {
        WorkflowOutcome::Completed(snapshot) => {
            assert_eq!(snapshot.status, WorkflowStatus::Completed);
            assert_eq!(snapshot.state["persist"], json!("persisted"));
        }
        other => panic!("expected completion, got {other:?}"),
    }

    // Only the interrupted step re-executed.
    assert_eq!(first_runs.load(Ordering::SeqCst), 0);
    assert_eq!(second_runs.load(Ordering::SeqCst), 1);
}

fn gated_engine(
    workflow_id: &str,
    checkpoint: Arc<dyn CheckpointStore>,
    channel: Arc<RecordingChannel>,
) -> WorkflowEngine {
    WorkflowEngine::new(workflow_id, checkpoint)
        .with_confirmation(channel)
        .step("build", &[], |_ctx| async {
            Ok(StepOutcome::Complete(json!({"entities": 12})))
        })
        .step("review", &["build"], |_ctx| async {
            Ok(StepOutcome::AwaitConfirmation {
                prompt: "Publish 12 entities?".to_string(),
            })
        })
        .step("publish", &["review"], |ctx| {
            let decision = ctx.output_of("review").cloned();
            async move { Ok(StepOutcome::Complete(decision.unwrap_or(json!(null)))) }
        })
}

#[tokio::test]
async fn test_pause_approve_resume() {
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let channel = Arc::new(RecordingChannel::default());

    let engine = gated_engine("wf-1", Arc::clone(&checkpoint), Arc::clone(&channel));
    match engine.run().await.unwrap() {
        WorkflowOutcome::Paused { step_id, prompt, .. } => {
            assert_eq!(step_id, "review");
            assert_eq!(prompt, "Publish 12 entities?");
        }
        other => panic!("expected pause, got {other:?}"),
    }
    assert_eq!(channel.requests.lock().unwrap().len(), 1);

    // A fresh engine (as after a process restart) resumes from the
    // checkpoint alone.
    let resumed = gated_engine("wf-1", Arc::clone(&checkpoint), Arc::clone(&channel));
    match resumed
        .resume(Confirmation::approve_with(json!({"note": "looks good"})))
        .await
        .unwrap()
    {
        WorkflowOutcome::Completed(snapshot) => {
            assert_eq!(snapshot.status, WorkflowStatus::Completed);
            assert_eq!(
                snapshot.state["confirmation:review"],
                json!({"note": "looks good"})
            );
            assert_eq!(snapshot.step("publish").unwrap().status, StepStatus::Succeeded);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejection_fails_the_paused_step() {
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let channel = Arc::new(RecordingChannel::default());

    let engine = gated_engine("wf-1", Arc::clone(&checkpoint), Arc::clone(&channel));
    engine.run().await.unwrap();

    match engine.resume(Confirmation::reject()).await.unwrap() {
        WorkflowOutcome::Failed { step_id, snapshot, .. } => {
            assert_eq!(step_id, "review");
            assert_eq!(snapshot.status, WorkflowStatus::Failed);
            assert_eq!(snapshot.step("publish").unwrap().status, StepStatus::Pending);
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // Resuming a failed workflow is refused.
    assert!(engine.resume(Confirmation::approve()).await.is_err());
}

#[tokio::test]
async fn test_confirmation_deadline_expiry() {
    let checkpoint: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
    let channel = Arc::new(RecordingChannel::default());

    let engine = gated_engine("wf-1", Arc::clone(&checkpoint), Arc::clone(&channel));
    engine.run().await.unwrap();

    // Backdate the pause beyond the deadline.
    {
        let mut snapshot = checkpoint.load("wf-1").unwrap().unwrap();
        let step = snapshot.steps.iter_mut().find(|s| s.id == "review").unwrap();
        step.paused_at = Some(chrono::Utc::now() - chrono::Duration::hours(2));
        checkpoint.save(&snapshot).unwrap();
    }

    let strict = gated_engine("wf-1", Arc::clone(&checkpoint), channel).with_config(
        WorkflowConfig {
            confirmation_deadline_secs: Some(3600),
            ..Default::default()
        },
    );
    match strict.resume(Confirmation::approve()).await.unwrap() {
        WorkflowOutcome::Failed { step_id, error, .. } => {
            assert_eq!(step_id, "review");
            assert!(error.contains("deadline"));
        }
        other => panic!("expected deadline failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_checkpoints_survive_process_boundary_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");
    let channel = Arc::new(RecordingChannel::default());

    {
        let checkpoint: Arc<dyn CheckpointStore> =
            Arc::new(SqliteCheckpointStore::new(&path).unwrap());
        let engine = gated_engine("wf-1", checkpoint, Arc::clone(&channel));
        assert!(matches!(
            engine.run().await.unwrap(),
            WorkflowOutcome::Paused { .. }
        ));
    }

    // Everything above is dropped; only the database file remains.
    let checkpoint: Arc<dyn CheckpointStore> =
        Arc::new(SqliteCheckpointStore::new(&path).unwrap());
    let engine = gated_engine("wf-1", checkpoint, channel);
    assert!(matches!(
        engine.resume(Confirmation::approve()).await.unwrap(),
        WorkflowOutcome::Completed(_)
    ));
}
