//! Task registry.
//!
//! A task is created in the `Processing` state when a request is accepted and
//! is finished exactly once by the background worker. The registry is the
//! only place where task state is shared between the worker and the HTTP
//! layer.

use crate::error::{ClipForgeError, Result};
use crate::video::VideoArtifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Status message shown for tasks completed with the placeholder video.
pub const FALLBACK_MESSAGE: &str = "All generation methods failed, showing fallback video";

/// Opaque task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for TaskId {
    type Err = ClipForgeError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ClipForgeError::TaskNotFound(s.to_string()))
    }
}

/// Externally visible task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The fallback chain is still running.
    Processing,
    /// A video (generated or placeholder) is available.
    Completed,
    /// Not even the placeholder could be produced.
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting for the fallback chain.
    Processing,
    /// Finished with a playable video.
    Completed {
        /// The finished video.
        video: VideoArtifact,
        /// True when the video is the placeholder.
        is_fallback: bool,
    },
    /// Finished without any video.
    Failed {
        /// Combined failure description.
        error: String,
    },
}

impl TaskState {
    /// Projects the state onto its status.
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Processing => TaskStatus::Processing,
            Self::Completed { .. } => TaskStatus::Completed,
            Self::Failed { .. } => TaskStatus::Failed,
        }
    }

    /// True once the task can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// A registered task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Identifier handed to the caller.
    pub id: TaskId,
    /// Current state.
    pub state: TaskState,
    /// Per-provider failure messages, in chain order.
    pub error_trail: Vec<String>,
}

impl Task {
    /// Creates a task in the processing state.
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            state: TaskState::Processing,
            error_trail: Vec::new(),
        }
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Path of the finished video, if the task completed.
    pub fn video_path(&self) -> Option<&PathBuf> {
        match &self.state {
            TaskState::Completed { video, .. } => Some(&video.path),
            _ => None,
        }
    }

    /// Builds the status response for this task.
    pub fn view(&self) -> TaskView {
        let mut view = TaskView {
            status: self.status(),
            video_url: None,
            is_fallback: None,
            generator: None,
            message: None,
            error: None,
            error_details: None,
        };

        match &self.state {
            TaskState::Processing => {}
            TaskState::Completed { video, is_fallback } => {
                view.video_url = Some(format!("/api/videos/{}", self.id));
                view.is_fallback = Some(*is_fallback);
                view.generator = Some(video.generator.clone());
                if *is_fallback {
                    view.message = Some(FALLBACK_MESSAGE.to_string());
                    view.error_details = self.trail_details();
                }
            }
            TaskState::Failed { error } => {
                view.error = Some(error.clone());
                view.error_details = self.trail_details();
            }
        }
        view
    }

    fn trail_details(&self) -> Option<String> {
        (!self.error_trail.is_empty()).then(|| self.error_trail.join("\n"))
    }
}

/// Status payload returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskView {
    /// Current status.
    pub status: TaskStatus,
    /// Download location, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Whether the video is the placeholder, once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fallback: Option<bool>,
    /// Name of the provider (or placeholder) that produced the video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<String>,
    /// Human-readable note, set for placeholder videos.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure description, once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Newline-joined provider failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

/// Storage for task state.
///
/// Every write replaces the whole state of one task atomically.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Registers a new task in the processing state.
    async fn create(&self, id: TaskId) -> Result<Task>;

    /// Looks up a task.
    async fn get(&self, id: TaskId) -> Result<Task>;

    /// Moves a processing task into a terminal state.
    async fn finish(&self, id: TaskId, state: TaskState, error_trail: Vec<String>) -> Result<Task>;

    /// Number of registered tasks.
    async fn len(&self) -> usize;

    /// True when no task has been registered.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Process-local task store. Tasks live until the process exits.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl InMemoryTaskStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, id: TaskId) -> Result<Task> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&id) {
            return Err(ClipForgeError::TaskConflict(id.to_string()));
        }
        let task = Task::new(id);
        tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Task> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ClipForgeError::TaskNotFound(id.to_string()))
    }

    async fn finish(&self, id: TaskId, state: TaskState, error_trail: Vec<String>) -> Result<Task> {
        if !state.is_terminal() {
            return Err(ClipForgeError::InvalidRequest(format!(
                "task {id} can only be finished with a terminal state"
            )));
        }

        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| ClipForgeError::TaskNotFound(id.to_string()))?;
        if task.state.is_terminal() {
            return Err(ClipForgeError::TaskAlreadyFinished(id.to_string()));
        }

        *task = Task {
            id,
            state,
            error_trail,
        };
        Ok(task.clone())
    }

    async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(is_fallback: bool) -> TaskState {
        TaskState::Completed {
            video: VideoArtifact::new("videos/clip.mp4", "Runway"),
            is_fallback,
        }
    }

    #[tokio::test]
    async fn test_create_starts_processing() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        let task = store.create(id).await.unwrap();

        assert_eq!(task.status(), TaskStatus::Processing);
        assert_eq!(store.get(id).await.unwrap().status(), TaskStatus::Processing);
        assert_eq!(store.len().await, 1);
        assert!(task.video_path().is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.create(id).await.unwrap();
        assert!(matches!(
            store.create(id).await,
            Err(ClipForgeError::TaskConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_get_unknown() {
        let store = InMemoryTaskStore::new();
        let err = store.get(TaskId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_finish_is_final() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.create(id).await.unwrap();

        let task = store.finish(id, completed(false), vec![]).await.unwrap();
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.video_path(), Some(&PathBuf::from("videos/clip.mp4")));

        let err = store
            .finish(id, TaskState::Failed { error: "late".into() }, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, ClipForgeError::TaskAlreadyFinished(_)));
        assert_eq!(store.get(id).await.unwrap().status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_finish_rejects_processing_state() {
        let store = InMemoryTaskStore::new();
        let id = TaskId::new();
        store.create(id).await.unwrap();
        assert!(store.finish(id, TaskState::Processing, vec![]).await.is_err());
        assert!(store
            .finish(TaskId::new(), completed(false), vec![])
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_view_processing() {
        let task = Task::new(TaskId::new());
        let json = serde_json::to_value(task.view()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "processing" }));
    }

    #[test]
    fn test_view_fallback() {
        let id = TaskId::new();
        let task = Task {
            id,
            state: completed(true),
            error_trail: vec![
                "Runway generation failed: timeout".into(),
                "Stability AI generation failed: 500".into(),
            ],
        };
        let view = task.view();

        assert_eq!(view.status, TaskStatus::Completed);
        assert_eq!(view.video_url, Some(format!("/api/videos/{id}")));
        assert_eq!(view.is_fallback, Some(true));
        assert_eq!(view.message.as_deref(), Some(FALLBACK_MESSAGE));
        assert_eq!(
            view.error_details.as_deref(),
            Some("Runway generation failed: timeout\nStability AI generation failed: 500")
        );
        assert!(view.error.is_none());
    }

    #[test]
    fn test_view_failed() {
        let task = Task {
            id: TaskId::new(),
            state: TaskState::Failed {
                error: "encoder missing".into(),
            },
            error_trail: vec!["Runway generation failed: 500".into()],
        };
        let json = serde_json::to_value(task.view()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "encoder missing");
        assert!(json.get("video_url").is_none());
    }

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert!("not-a-task".parse::<TaskId>().unwrap_err().is_not_found());
    }
}
