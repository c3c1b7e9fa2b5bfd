use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::engine::local::DEFAULT_RETENTION;
use crate::engine::{Engine, StartWorkflowOptions};
use crate::error::{ConfigError, ServerError};
use crate::workflow::Message;

/// Sender identity on every acknowledgment.
pub const BOT_USER: &str = "Bot";

/// Task queue the chat bot worker polls.
pub const DEFAULT_TASK_QUEUE: &str = "prompts";

/// Retention for timestamp-keyed executions: long enough for a retried
/// submission in the same millisecond to attach, short enough not to pile up.
pub const TIMESTAMP_RETENTION: Duration = Duration::from_secs(60);

/// How the execution identity is derived from a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// `prompt_<user>_<unix millis>`. Only submissions from the same user in
    /// the same millisecond coalesce; a resubmission a moment later runs again.
    #[default]
    Timestamp,
    /// `prompt_<user>_<sha256(user, content)>`. Identical submissions coalesce
    /// for as long as the engine retains the execution.
    ContentHash,
}

impl FromStr for KeyStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" => Ok(Self::Timestamp),
            "content_hash" | "hash" => Ok(Self::ContentHash),
            other => Err(ConfigError::UnknownValue {
                field: "key_strategy",
                value: other.to_string(),
            }),
        }
    }
}

impl KeyStrategy {
    /// Timestamp keys are never reused, so there is nothing to attach to
    /// once a request has had its answer.
    pub fn retention(&self) -> Duration {
        match self {
            Self::Timestamp => TIMESTAMP_RETENTION,
            Self::ContentHash => DEFAULT_RETENTION,
        }
    }

    pub fn key(&self, req: &Message, submitted_at: SystemTime) -> String {
        match self {
            Self::Timestamp => {
                let millis = submitted_at
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or_default();
                format!("prompt_{}_{millis}", req.user)
            }
            Self::ContentHash => {
                let mut hasher = Sha256::new();
                hasher.update(req.user.as_bytes());
                hasher.update([0u8]);
                hasher.update(req.content.as_bytes());
                format!("prompt_{}_{}", req.user, hex::encode(hasher.finalize()))
            }
        }
    }
}

/// Synchronous front door to the workflow: one call per request, blocking
/// until the execution finishes or the caller gives up.
#[derive(Clone)]
pub struct Bridge {
    engine: Arc<dyn Engine>,
    task_queue: String,
    keys: KeyStrategy,
}

impl Bridge {
    pub fn new(engine: Arc<dyn Engine>, task_queue: impl Into<String>, keys: KeyStrategy) -> Self {
        Self {
            engine,
            task_queue: task_queue.into(),
            keys,
        }
    }

    pub async fn dispatch(
        &self,
        req: Message,
        cancel: &CancellationToken,
    ) -> Result<Message, ServerError> {
        let id = self.keys.key(&req, SystemTime::now());
        let options = StartWorkflowOptions {
            id: id.clone(),
            task_queue: self.task_queue.clone(),
        };

        let mut handle = self
            .engine
            .start_workflow(options, req)
            .await
            .map_err(|e| {
                tracing::error!(workflow_id = %id, "unable to execute workflow: {e}");
                ServerError {
                    execution_id: id.clone(),
                    cause: e.user_message(),
                }
            })?;
        let run_id = handle.run_id().to_string();
        tracing::debug!(
            workflow_id = %id,
            run_id = %run_id,
            attached = handle.attached(),
            "waiting for workflow"
        );

        let ack = tokio::select! {
            result = handle.result() => result.map_err(|e| {
                tracing::error!(workflow_id = %id, run_id = %run_id, "workflow result failed: {e}");
                ServerError {
                    execution_id: id.clone(),
                    cause: e.user_message(),
                }
            })?,
            _ = cancel.cancelled() => {
                tracing::info!(workflow_id = %id, "caller went away, execution continues");
                return Err(ServerError {
                    execution_id: id.clone(),
                    cause: "request cancelled".to_string(),
                });
            }
        };

        Ok(Message {
            user: BOT_USER.to_string(),
            content: ack,
        })
    }
}
