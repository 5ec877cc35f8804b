//! Task Registry - shared store of every submitted task
//!
//! Tasks are never removed; the registry lives as long as the process.
//! Reads never suspend: the map sits behind a `parking_lot::RwLock` that is
//! only held long enough to clone `Arc`s out of it.

use crate::state::{TaskFilter, TaskStatus};
use crate::surface::ExecutionChannel;
use crate::task::{Task, TaskId, TaskSummary};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of command characters shown in listings
pub const DEFAULT_PREVIEW_LENGTH: usize = 50;

#[derive(Default)]
struct RegistryInner {
    tasks: HashMap<TaskId, Arc<Task>>,
    /// Insertion order, used for listings
    order: Vec<TaskId>,
}

/// Concurrently accessed map from task id to task record
pub struct TaskRegistry {
    inner: RwLock<RegistryInner>,
    preview_len: usize,
}

/// Per-status task counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_preview_len(DEFAULT_PREVIEW_LENGTH)
    }

    pub fn with_preview_len(preview_len: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            preview_len: preview_len.max(1),
        }
    }

    pub fn preview_len(&self) -> usize {
        self.preview_len
    }

    /// Insert a new `running` task bound to `channel`
    pub fn create(
        &self,
        command: impl Into<String>,
        working_directory: Option<String>,
        channel: Arc<dyn ExecutionChannel>,
    ) -> Arc<Task> {
        let mut inner = self.inner.write();

        let mut id = TaskId::new();
        while inner.tasks.contains_key(&id) {
            warn!("Task id collision on {}, generating another", id);
            id = TaskId::new();
        }

        let task = Arc::new(Task::new(id, command, working_directory, channel));
        inner.tasks.insert(id, Arc::clone(&task));
        inner.order.push(id);
        debug!("Registered task {} ({} total)", id, inner.order.len());

        task
    }

    pub fn get(&self, id: &TaskId) -> Option<Arc<Task>> {
        self.inner.read().tasks.get(id).cloned()
    }

    /// Look up by the raw id string; anything unparsable is simply unknown
    pub fn lookup(&self, raw_id: &str) -> Option<Arc<Task>> {
        let id = raw_id.parse::<TaskId>().ok()?;
        self.get(&id)
    }

    /// Summaries of tasks matching `filter`, in submission order.
    ///
    /// The set of tasks is fixed when called; each summary is taken when the
    /// iterator reaches it.
    pub fn list(&self, filter: TaskFilter) -> impl Iterator<Item = TaskSummary> {
        let tasks = self.all();
        let preview_len = self.preview_len;
        tasks
            .into_iter()
            .map(move |task| task.summary(preview_len))
            .filter(move |summary| filter.matches(summary.status))
    }

    /// Every task, in submission order
    pub fn all(&self) -> Vec<Arc<Task>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.tasks.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for task in self.all() {
            stats.total += 1;
            match task.status() {
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
