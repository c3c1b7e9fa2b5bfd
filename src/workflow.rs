use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assistant::Assistant;
use crate::engine::{ActivityOptions, WorkflowContext, Worker};
use crate::error::{ConfigError, WorkflowError};

/// Start-to-close budget for the acknowledge activity.
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// A chat message. Inbound requests and outbound acknowledgments share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub user: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Started,
    AwaitingActivity,
    Succeeded,
    Failed,
}

/// What the workflow does when the assistant cannot produce a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the cause and complete with an empty acknowledgment. Callers cannot
    /// tell this apart from a genuinely empty reply.
    #[default]
    AcknowledgeEmpty,
    /// Fail the execution so the bridge reports "generation failed".
    Surface,
}

impl FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledge_empty" | "swallow" => Ok(Self::AcknowledgeEmpty),
            "surface" => Ok(Self::Surface),
            other => Err(ConfigError::UnknownValue {
                field: "on_failure",
                value: other.to_string(),
            }),
        }
    }
}

/// Per-worker workflow settings.
#[derive(Debug, Clone)]
pub struct ChatBot {
    pub activity_timeout: Duration,
    pub on_failure: FailurePolicy,
}

impl Default for ChatBot {
    fn default() -> Self {
        Self {
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT,
            on_failure: FailurePolicy::default(),
        }
    }
}

impl ChatBot {
    /// Worker that runs this workflow on `task_queue` against `assistant`.
    pub fn worker(self, task_queue: impl Into<String>, assistant: Arc<dyn Assistant>) -> Worker {
        Worker::new(
            task_queue,
            move |ctx, req| self.clone().run(ctx, req),
            assistant,
        )
    }

    /// Acknowledge `req` through whichever assistant the worker was registered with.
    ///
    /// Pure orchestration: the remote call happens inside the activity, and
    /// retries come from the engine's retry policy, not from a loop here.
    pub async fn run(self, ctx: WorkflowContext, req: Message) -> Result<String, WorkflowError> {
        let mut state = WorkflowState::Started;
        tracing::debug!(user = %req.user, ?state, "execute workflow for chat bot acknowledge");

        let options = ActivityOptions::with_start_to_close(self.activity_timeout);
        state = WorkflowState::AwaitingActivity;
        tracing::debug!(?state, "scheduling acknowledge activity");

        match ctx.execute_activity(&options, &req.content).await {
            Ok(ack) => {
                state = WorkflowState::Succeeded;
                tracing::debug!(?state, "acknowledge completed");
                Ok(ack)
            }
            Err(e) => {
                state = WorkflowState::Failed;
                tracing::error!(
                    ?state,
                    execution_id = ctx.execution_id(),
                    "get acknowledge failed: {e}"
                );
                match self.on_failure {
                    FailurePolicy::AcknowledgeEmpty => Ok(String::new()),
                    FailurePolicy::Surface => Err(WorkflowError::GenerationFailed(e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses() {
        assert_eq!(
            "surface".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::Surface
        );
        assert_eq!(
            "ACKNOWLEDGE_EMPTY".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::AcknowledgeEmpty
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn message_wire_shape() {
        let msg: Message = serde_json::from_str(r#"{"user":"Test","content":"Hello"}"#).unwrap();
        assert_eq!(msg.user, "Test");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"user": "Test", "content": "Hello"})
        );
    }
}
