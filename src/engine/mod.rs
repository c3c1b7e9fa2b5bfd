//! Durable-execution collaborator.
//!
//! The workflow and bridge talk to the engine only through the [`Engine`]
//! trait, so the in-process [`local::LocalEngine`] can be swapped for a
//! networked engine without touching orchestration code. The contract:
//!
//! - **Start-or-attach**: starting a workflow under an id that is running or
//!   still retained as completed returns a handle to that execution instead
//!   of starting a second one.
//! - **Get result**: [`WorkflowHandle::result`] waits for the terminal state.
//! - **Activities**: [`WorkflowContext::execute_activity`] runs the bound
//!   assistant under a start-to-close timeout and the retry policy.
//! - **Workers**: a [`Worker`] binds a workflow function and its assistant to
//!   a named task queue.

pub mod local;
pub mod retry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::sync::watch;

use crate::assistant::Assistant;
use crate::error::{ActivityError, EngineError, WorkflowError};
use crate::workflow::Message;

pub use retry::RetryPolicy;

/// A registered workflow function.
pub type WorkflowFn = Arc<dyn Fn(WorkflowContext, Message) -> WorkflowFuture + Send + Sync>;

pub type WorkflowFuture = BoxFuture<'static, Result<String, WorkflowError>>;

#[derive(Debug, Clone)]
pub struct StartWorkflowOptions {
    /// Execution identity. Doubles as the idempotency key.
    pub id: String,
    pub task_queue: String,
}

#[derive(Debug, Clone)]
pub struct ActivityOptions {
    /// Upper bound for a single attempt.
    pub start_to_close_timeout: Duration,
    /// Upper bound for all attempts together. Defaults to `start_to_close_timeout`.
    pub schedule_to_close_timeout: Option<Duration>,
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn with_start_to_close(timeout: Duration) -> Self {
        Self {
            start_to_close_timeout: timeout,
            schedule_to_close_timeout: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn budget(&self) -> Duration {
        self.schedule_to_close_timeout.unwrap_or(self.start_to_close_timeout)
    }
}

/// Binds a workflow and the assistant its activities run against to a task queue.
/// The binding is fixed at registration; requests never pick the assistant.
#[derive(Clone)]
pub struct Worker {
    pub task_queue: String,
    pub workflow: WorkflowFn,
    pub assistant: Arc<dyn Assistant>,
}

impl Worker {
    pub fn new<F, Fut>(
        task_queue: impl Into<String>,
        workflow: F,
        assistant: Arc<dyn Assistant>,
    ) -> Self
    where
        F: Fn(WorkflowContext, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, WorkflowError>> + Send + 'static,
    {
        Self {
            task_queue: task_queue.into(),
            workflow: Arc::new(move |ctx: WorkflowContext, msg: Message| -> WorkflowFuture {
                Box::pin(workflow(ctx, msg))
            }),
            assistant,
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("task_queue", &self.task_queue)
            .field("assistant", &self.assistant.provider())
            .finish()
    }
}

#[async_trait]
pub trait Engine: Send + Sync {
    /// Bind a worker to its task queue. A later worker on the same queue replaces it.
    fn register_worker(&self, worker: Worker);

    /// Start a workflow execution, or attach to the one already known under `options.id`.
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        input: Message,
    ) -> Result<WorkflowHandle, EngineError>;
}

/// Terminal state of an execution as seen by handles.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub result: Result<String, EngineError>,
    pub at: Instant,
}

/// Handle to a started (or attached) execution.
#[derive(Debug)]
pub struct WorkflowHandle {
    id: String,
    run_id: String,
    attached: bool,
    outcome: watch::Receiver<Option<Completion>>,
}

impl WorkflowHandle {
    pub(crate) fn new(
        id: String,
        run_id: String,
        attached: bool,
        outcome: watch::Receiver<Option<Completion>>,
    ) -> Self {
        Self {
            id,
            run_id,
            attached,
            outcome,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// True when this handle joined an execution started by an earlier request.
    pub fn attached(&self) -> bool {
        self.attached
    }

    /// Wait for the execution to reach a terminal state.
    /// Dropping this future stops waiting; the execution keeps running.
    pub async fn result(&mut self) -> Result<String, EngineError> {
        let completed = self
            .outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| EngineError::ExecutionDropped(self.id.clone()))?;

        match &*completed {
            Some(c) => c.result.clone(),
            None => Err(EngineError::ExecutionDropped(self.id.clone())),
        }
    }
}

/// What a workflow function may do. It never reaches the network directly;
/// every effect goes through [`WorkflowContext::execute_activity`].
#[derive(Clone)]
pub struct WorkflowContext {
    execution_id: String,
    assistant: Arc<dyn Assistant>,
}

impl WorkflowContext {
    pub(crate) fn new(execution_id: String, assistant: Arc<dyn Assistant>) -> Self {
        Self {
            execution_id,
            assistant,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Run the bound assistant's `acknowledge` activity under `options`.
    pub async fn execute_activity(
        &self,
        options: &ActivityOptions,
        input: &str,
    ) -> Result<String, ActivityError> {
        retry::run_activity(self.assistant.as_ref(), options, input).await
    }
}
