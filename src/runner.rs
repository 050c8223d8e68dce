//! Background task dispatch.

use crate::chain::FallbackChain;
use crate::error::{ClipForgeError, Result};
use crate::task::{Task, TaskId, TaskState, TaskStore, TaskView};
use crate::video::VideoGenerationRequest;
use std::path::PathBuf;
use std::sync::Arc;

/// Accepts generation requests and drives each through the fallback chain.
///
/// Cloning is cheap; every clone shares the same store and chain.
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn TaskStore>,
    chain: Arc<FallbackChain>,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Creates a runner over `store` and `chain`.
    pub fn new(store: Arc<dyn TaskStore>, chain: Arc<FallbackChain>) -> Self {
        Self { store, chain }
    }

    /// The fallback chain every task runs through.
    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// The task registry.
    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Registers a task and starts the chain in the background.
    ///
    /// Returns as soon as the task is registered; the result is observable
    /// only through [`TaskRunner::status`].
    pub async fn submit(&self, request: VideoGenerationRequest) -> Result<TaskId> {
        let id = TaskId::new();
        self.store.create(id).await?;
        tracing::info!(task_id = %id, prompt = %request.prompt, "task accepted");

        let runner = self.clone();
        tokio::spawn(async move {
            if let Err(e) = runner.execute(id, request).await {
                tracing::error!(task_id = %id, error = %e, "failed to record task result");
            }
        });

        Ok(id)
    }

    /// Registers a task and waits for it to finish.
    pub async fn run(&self, request: VideoGenerationRequest) -> Result<Task> {
        let id = TaskId::new();
        self.store.create(id).await?;
        tracing::info!(task_id = %id, prompt = %request.prompt, "task accepted");
        self.execute(id, request).await
    }

    /// Runs the chain on its own task so that a panic inside a provider or
    /// the placeholder still leaves the task `Failed`.
    async fn execute(&self, id: TaskId, request: VideoGenerationRequest) -> Result<Task> {
        let chain = Arc::clone(&self.chain);
        let attempt = tokio::spawn(async move { chain.run(&request).await.into_task_state() });

        let (state, trail) = match attempt.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "generation aborted");
                let error = format!("generation aborted: {e}");
                (TaskState::Failed { error }, Vec::new())
            }
        };
        let task = self.store.finish(id, state, trail).await?;
        tracing::info!(
            task_id = %id,
            status = %task.status(),
            failures = task.error_trail.len(),
            "task finished"
        );
        Ok(task)
    }

    /// Current status of a task.
    pub async fn status(&self, id: TaskId) -> Result<TaskView> {
        Ok(self.store.get(id).await?.view())
    }

    /// Path of a completed task's video.
    ///
    /// Unknown, processing and failed tasks all report [`ClipForgeError::TaskNotFound`].
    pub async fn fetch_artifact(&self, id: TaskId) -> Result<PathBuf> {
        let task = self.store.get(id).await?;
        task.video_path()
            .cloned()
            .ok_or_else(|| ClipForgeError::TaskNotFound(id.to_string()))
    }
}
