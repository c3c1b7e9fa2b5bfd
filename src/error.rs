use std::time::Duration;

use thiserror::Error;

/// Failure of a single backend call. The workflow decides what a caller sees.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("transport failure from {provider}: {message}")]
    TransportFailure {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("empty reply from {provider}")]
    EmptyReply { provider: String },
}

impl AssistantError {
    pub fn provider(&self) -> &str {
        match self {
            Self::TransportFailure { provider, .. } => provider,
            Self::MalformedResponse { provider, .. } => provider,
            Self::EmptyReply { provider } => provider,
        }
    }

    /// Returns true for transient errors that may succeed on retry.
    /// A body that failed to parse will fail the same way next time.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransportFailure { status, .. } => {
                // 4xx is the caller's fault, except throttling
                status.is_none_or(|s| s >= 500 || s == 429 || s == 408)
            }
            Self::MalformedResponse { .. } => false,
            Self::EmptyReply { .. } => false,
        }
    }
}

/// Invalid backend configuration. Fatal at startup, never per request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend URL is not present")]
    MissingUrl,

    #[error("backend URL {url:?} is invalid: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("unknown {field} value: {value:?}")]
    UnknownValue { field: &'static str, value: String },

    #[error("failed to read config file {path}: {message}")]
    File { path: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Outcome of an activity once the engine stops retrying it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActivityError {
    #[error("activity timed out after {}ms ({attempts} attempts)", .budget.as_millis())]
    Timeout { budget: Duration, attempts: u32 },

    #[error("activity failed after {attempts} attempts: {source}")]
    Failed {
        #[source]
        source: AssistantError,
        attempts: u32,
    },
}

/// Terminal failure of a workflow execution.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("generation failed: {0}")]
    GenerationFailed(#[from] ActivityError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no worker registered for task queue {0:?}")]
    UnknownTaskQueue(String),

    #[error("workflow execution {id} failed: {source}")]
    WorkflowFailed {
        id: String,
        #[source]
        source: WorkflowError,
    },

    #[error("workflow execution {id} panicked: {message}")]
    WorkflowPanicked { id: String, message: String },

    #[error("workflow execution {0} was dropped before completing")]
    ExecutionDropped(String),
}

impl EngineError {
    /// Sanitized message safe for HTTP callers. Upstream bodies and URLs stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownTaskQueue(queue) => format!("no worker polling task queue {queue}"),
            Self::WorkflowFailed { source, .. } => match source {
                WorkflowError::GenerationFailed(ActivityError::Timeout { budget, .. }) => {
                    format!("generation failed: timed out after {}s", budget.as_secs())
                }
                WorkflowError::GenerationFailed(ActivityError::Failed { source, .. }) => {
                    match source {
                        AssistantError::TransportFailure { provider, .. } => {
                            format!("generation failed: {provider} unreachable")
                        }
                        AssistantError::MalformedResponse { provider, .. } => {
                            format!("generation failed: unreadable response from {provider}")
                        }
                        AssistantError::EmptyReply { provider } => {
                            format!("generation failed: empty reply from {provider}")
                        }
                    }
                }
            },
            Self::WorkflowPanicked { .. } => "workflow execution aborted".to_string(),
            Self::ExecutionDropped(_) => "workflow execution was dropped".to_string(),
        }
    }
}

/// Error payload returned to synchronous callers, keyed by execution identity.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ServerError {
    #[serde(rename = "operation_id")]
    pub execution_id: String,
    #[serde(rename = "error")]
    pub cause: String,
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.execution_id, self.cause)
    }
}

impl std::error::Error for ServerError {}
