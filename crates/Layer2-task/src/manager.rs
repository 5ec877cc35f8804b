//! Task Manager - the control surface over the registry and executor
//!
//! Features:
//! - submit: validate, acquire a channel, register, spawn detached
//! - status / list: read-only views that never suspend
//! - cancel: guarded transition to `cancelled` plus a best-effort interrupt
//! - wait / stats: conveniences for in-process callers
//!
//! Not-found and not-running are structured replies, not errors. Only an
//! invalid command or a missing execution surface fails `submit`.

use crate::executor::{ExecutorConfig, TaskExecutor};
use crate::registry::{RegistryStats, TaskRegistry, DEFAULT_PREVIEW_LENGTH};
use crate::state::{TaskFilter, TaskStatus};
use crate::surface::{build_surface, ExecutionSurface};
use crate::task::{TaskId, TaskSnapshot, TaskSummary};
use chrono::{DateTime, Utc};
use relay_foundation::{Error, RelayConfig, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for task manager
#[derive(Debug, Clone)]
pub struct TaskManagerConfig {
    /// Readiness wait applied to every new channel
    pub readiness_timeout: Duration,

    /// Command characters shown by `list`
    pub preview_length: usize,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: ExecutorConfig::default().readiness_timeout,
            preview_length: DEFAULT_PREVIEW_LENGTH,
        }
    }
}

impl From<&RelayConfig> for TaskManagerConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            readiness_timeout: config.readiness_timeout(),
            preview_length: config.preview_length,
        }
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Reply to a successful submit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

/// Unknown task id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFound {
    pub error: &'static str,
    pub task_id: String,
}

impl NotFound {
    fn new(task_id: &str) -> Self {
        Self {
            error: "not found",
            task_id: task_id.to_string(),
        }
    }
}

/// Reply to `status`
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatusReply {
    Found(TaskSnapshot),
    NotFound(NotFound),
}

impl StatusReply {
    pub fn snapshot(&self) -> Option<&TaskSnapshot> {
        match self {
            StatusReply::Found(snapshot) => Some(snapshot),
            StatusReply::NotFound(_) => None,
        }
    }
}

/// Reply to `list`
#[derive(Debug, Clone, Serialize)]
pub struct TaskListing {
    pub count: usize,
    pub tasks: Vec<TaskSummary>,
}

/// Cancel accepted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cancelled {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
}

/// Cancel refused because the task already finished
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotRunning {
    pub error: &'static str,
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// Reply to `cancel`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CancelReply {
    Cancelled(Cancelled),
    NotFound(NotFound),
    NotRunning(NotRunning),
}

impl CancelReply {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CancelReply::Cancelled(_))
    }
}

// ============================================================================
// Task Manager
// ============================================================================

/// Task Manager - accepts commands and answers queries about them
#[derive(Clone)]
pub struct TaskManager {
    /// All tasks ever submitted
    registry: Arc<TaskRegistry>,

    /// Where channels come from
    surface: Arc<dyn ExecutionSurface>,

    /// Drives tasks in the background
    executor: Arc<TaskExecutor>,
}

impl TaskManager {
    /// Create a task manager with its own registry
    pub fn new(surface: Arc<dyn ExecutionSurface>, config: TaskManagerConfig) -> Self {
        let registry = Arc::new(TaskRegistry::with_preview_len(config.preview_length));
        Self::with_registry(surface, registry, config)
    }

    /// Create a task manager over an existing registry
    pub fn with_registry(
        surface: Arc<dyn ExecutionSurface>,
        registry: Arc<TaskRegistry>,
        config: TaskManagerConfig,
    ) -> Self {
        let executor = Arc::new(TaskExecutor::new(
            Arc::clone(&surface),
            ExecutorConfig {
                readiness_timeout: config.readiness_timeout,
            },
        ));

        Self {
            registry,
            surface,
            executor,
        }
    }

    /// Build the surface named by `config` and wrap it
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(build_surface(config), TaskManagerConfig::from(config))
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn surface_name(&self) -> &'static str {
        self.surface.name()
    }

    /// Submit a command for background execution
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// task is registered; the command runs detached.
    pub fn submit(&self, command: &str, working_directory: Option<&str>) -> Result<SubmitReceipt> {
        if command.trim().is_empty() {
            return Err(Error::InvalidInput("command must not be empty".to_string()));
        }

        // No record is created unless a channel could be obtained
        let channel = self.surface.acquire()?;

        let working_directory = working_directory
            .filter(|dir| !dir.trim().is_empty())
            .map(str::to_string);
        let task = self.registry.create(command, working_directory, channel);
        info!(
            "Submitted task {} on {}: {}",
            task.id(),
            self.surface.name(),
            command
        );

        let receipt = SubmitReceipt {
            task_id: task.id(),
            status: TaskStatus::Running,
            command: task.command().to_string(),
            started_at: task.started_at(),
        };

        self.executor.spawn(task);
        Ok(receipt)
    }

    /// Current snapshot of a task
    pub fn status(&self, task_id: &str) -> StatusReply {
        match self.registry.lookup(task_id) {
            Some(task) => StatusReply::Found(task.snapshot()),
            None => StatusReply::NotFound(NotFound::new(task_id)),
        }
    }

    /// Summaries of tasks matching `filter`, in submission order
    pub fn list(&self, filter: TaskFilter) -> TaskListing {
        let tasks: Vec<TaskSummary> = self.registry.list(filter).collect();
        TaskListing {
            count: tasks.len(),
            tasks,
        }
    }

    /// Request cancellation of a running task
    pub fn cancel(&self, task_id: &str) -> CancelReply {
        let Some(task) = self.registry.lookup(task_id) else {
            return CancelReply::NotFound(NotFound::new(task_id));
        };

        if let Err(status) = task.cancel() {
            debug!("Cancel of task {} refused: already {}", task.id(), status);
            return CancelReply::NotRunning(NotRunning {
                error: "not running",
                task_id: task.id(),
                status,
            });
        }
        info!("Cancelled task {}", task.id());

        if let Err(e) = task.channel().signal_interrupt() {
            warn!("Failed to interrupt task {}: {}", task.id(), e);
            task.record_interrupt_failure(e.to_string());
        }

        CancelReply::Cancelled(Cancelled {
            task_id: task.id(),
            status: TaskStatus::Cancelled,
            message: "Task cancelled".to_string(),
        })
    }

    /// Wait until a task is terminal, up to `timeout`
    ///
    /// `None` for an unknown id or when the task is still running when the
    /// timeout expires.
    pub async fn wait(&self, task_id: &str, timeout: Duration) -> Option<TaskSnapshot> {
        let task = self.registry.lookup(task_id)?;
        let mut status = task.subscribe();

        let finished = async {
            loop {
                if task.status().is_terminal() {
                    return true;
                }
                if status.changed().await.is_err() {
                    return task.status().is_terminal();
                }
            }
        };

        match tokio::time::timeout(timeout, finished).await {
            Ok(true) => Some(task.snapshot()),
            _ => None,
        }
    }

    /// Per-status task counts
    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::LocalSurface;

    fn manager() -> TaskManager {
        TaskManager::new(
            Arc::new(LocalSurface::new("/nonexistent/shell-for-relay")),
            TaskManagerConfig::default(),
        )
    }

    #[test]
    fn test_not_found_wire_shape() {
        let manager = manager();
        let json = serde_json::to_value(manager.status("missing")).unwrap();
        assert_eq!(json["error"], "not found");
        assert_eq!(json["taskId"], "missing");

        let json = serde_json::to_value(manager.cancel("missing")).unwrap();
        assert_eq!(json["error"], "not found");
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.submit("   ", None),
            Err(Error::InvalidInput(_))
        ));
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_surface_leaves_no_record() {
        let manager = manager();
        assert!(matches!(
            manager.submit("echo hi", None),
            Err(Error::SurfaceUnavailable(_))
        ));
        assert_eq!(manager.list(TaskFilter::All).count, 0);
    }

    #[tokio::test]
    async fn test_wait_unknown() {
        let manager = manager();
        assert!(manager
            .wait(&TaskId::new().to_string(), Duration::from_millis(10))
            .await
            .is_none());
    }

    #[test]
    fn test_config_from_relay() {
        let config = TaskManagerConfig::from(&RelayConfig::default().readiness_timeout_ms(300));
        assert_eq!(config.readiness_timeout, Duration::from_millis(300));
        assert_eq!(config.preview_length, 50);
    }
}
