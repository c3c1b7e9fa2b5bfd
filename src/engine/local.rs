use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::Instrument;

use crate::engine::{
    Completion, Engine, StartWorkflowOptions, WorkflowContext, WorkflowHandle, Worker,
};
use crate::error::EngineError;
use crate::workflow::Message;

/// How long completed executions stay attachable by id.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

struct Execution {
    run_id: String,
    outcome: watch::Receiver<Option<Completion>>,
}

impl Execution {
    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.outcome
            .borrow()
            .as_ref()
            .is_some_and(|c| now.duration_since(c.at) > retention)
    }
}

#[derive(Default)]
struct State {
    workers: HashMap<String, Worker>,
    executions: HashMap<String, Execution>,
}

/// In-process engine. Each execution runs on its own tokio task; the
/// execution table is the only shared state and its lock is never held
/// across an await.
pub struct LocalEngine {
    state: Mutex<State>,
    retention: Duration,
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the maps half-updated.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of executions currently tracked (running or retained).
    pub fn execution_count(&self) -> usize {
        self.lock().executions.len()
    }

    fn spawn(
        &self,
        worker: &Worker,
        id: &str,
        run_id: &str,
        input: Message,
    ) -> watch::Receiver<Option<Completion>> {
        let (tx, rx) = watch::channel(None);
        let ctx = WorkflowContext::new(id.to_string(), Arc::clone(&worker.assistant));
        let span = tracing::info_span!("workflow", workflow_id = %id, run_id = %run_id);
        let run = tokio::spawn((worker.workflow)(ctx, input).instrument(span.clone()));
        let id = id.to_string();

        tokio::spawn(
            async move {
                let result = match run.await {
                    Ok(Ok(ack)) => Ok(ack),
                    Ok(Err(source)) => Err(EngineError::WorkflowFailed {
                        id: id.clone(),
                        source,
                    }),
                    Err(e) => Err(EngineError::WorkflowPanicked {
                        id: id.clone(),
                        message: e.to_string(),
                    }),
                };
                match &result {
                    Ok(_) => tracing::info!("workflow completed"),
                    Err(e) => tracing::error!("workflow failed: {e}"),
                }
                tx.send_replace(Some(Completion {
                    result,
                    at: Instant::now(),
                }));
            }
            .instrument(span),
        );

        rx
    }
}

#[async_trait]
impl Engine for LocalEngine {
    fn register_worker(&self, worker: Worker) {
        tracing::info!(
            task_queue = %worker.task_queue,
            assistant = worker.assistant.provider(),
            "worker registered"
        );
        self.lock()
            .workers
            .insert(worker.task_queue.clone(), worker);
    }

    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        input: Message,
    ) -> Result<WorkflowHandle, EngineError> {
        let now = Instant::now();
        let mut state = self.lock();

        let retention = self.retention;
        state.executions.retain(|_, e| !e.expired(now, retention));

        if let Some(existing) = state.executions.get(&options.id) {
            tracing::info!(
                workflow_id = %options.id,
                run_id = %existing.run_id,
                "attached to existing workflow execution"
            );
            return Ok(WorkflowHandle::new(
                options.id,
                existing.run_id.clone(),
                true,
                existing.outcome.clone(),
            ));
        }

        let worker = state
            .workers
            .get(&options.task_queue)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTaskQueue(options.task_queue.clone()))?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let outcome = self.spawn(&worker, &options.id, &run_id, input);
        state.executions.insert(
            options.id.clone(),
            Execution {
                run_id: run_id.clone(),
                outcome: outcome.clone(),
            },
        );
        drop(state);

        tracing::info!(workflow_id = %options.id, run_id = %run_id, "started workflow");
        Ok(WorkflowHandle::new(options.id, run_id, false, outcome))
    }
}
