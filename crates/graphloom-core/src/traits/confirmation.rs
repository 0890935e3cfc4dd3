//! Confirmation channel trait.

use async_trait::async_trait;

use crate::error::GraphloomResult;

/// Outbound side of the human-confirmation gate.
///
/// The workflow engine calls `request_confirmation` when a step pauses;
/// the implementation delivers the prompt to an external actor (a chat
/// bot, an ops console). The inbound side is
/// `WorkflowEngine::resume(workflow_id, confirmation)`, which may be
/// called hours or days later, in a different process.
#[async_trait]
pub trait ConfirmationChannel: Send + Sync {
    /// Notify an external actor that `step_id` is waiting for a
    /// decision. Failure here does not fail the step: the pause is
    /// already checkpointed and the prompt can be re-delivered.
    async fn request_confirmation(
        &self,
        workflow_id: &str,
        step_id: &str,
        prompt: &str,
    ) -> GraphloomResult<()>;
}
