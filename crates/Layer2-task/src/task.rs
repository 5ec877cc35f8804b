//! Task definition and types

use crate::state::TaskStatus;
use crate::surface::ExecutionChannel;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
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
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Mutable part of a task, guarded by one lock
#[derive(Debug)]
struct TaskProgress {
    status: TaskStatus,
    output: String,
    error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
}

/// One submitted command and its evolving state
///
/// `id`, `command`, `working_directory` and `started_at` never change. The
/// rest lives behind a per-task mutex which is the only place status,
/// output and completion time are mutated, so an append and a terminal
/// transition can never interleave.
pub struct Task {
    id: TaskId,
    command: String,
    working_directory: Option<String>,
    started_at: DateTime<Utc>,
    state: Mutex<TaskProgress>,
    status_tx: watch::Sender<TaskStatus>,
    channel: Arc<dyn ExecutionChannel>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        command: impl Into<String>,
        working_directory: Option<String>,
        channel: Arc<dyn ExecutionChannel>,
    ) -> Self {
        let (status_tx, _) = watch::channel(TaskStatus::Running);
        Self {
            id,
            command: command.into(),
            working_directory,
            started_at: Utc::now(),
            state: Mutex::new(TaskProgress {
                status: TaskStatus::Running,
                output: String::new(),
                error: None,
                completed_at: None,
            }),
            status_tx,
            channel,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn working_directory(&self) -> Option<&str> {
        self.working_directory.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn output(&self) -> String {
        self.state.lock().output.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().completed_at
    }

    /// Channel the command runs on; used to deliver interrupts
    pub fn channel(&self) -> &Arc<dyn ExecutionChannel> {
        &self.channel
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status_tx.subscribe()
    }

    /// Append a chunk if the task is still running.
    ///
    /// Returns `false` (and appends nothing) once the task is terminal.
    pub fn append_output(&self, chunk: &str) -> bool {
        let mut state = self.state.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.output.push_str(chunk);
        true
    }

    /// Move a running task to a terminal status.
    ///
    /// On success returns the completion time. If the task already left
    /// `running` nothing is changed and the existing status is returned as
    /// the error.
    pub fn finish(
        &self,
        status: TaskStatus,
        error: Option<String>,
    ) -> std::result::Result<DateTime<Utc>, TaskStatus> {
        let mut state = self.state.lock();
        if state.status.is_terminal() || !status.is_terminal() {
            return Err(state.status);
        }

        let now = Utc::now();
        state.status = status;
        state.error = error;
        state.completed_at = Some(now);
        self.status_tx.send_replace(status);
        Ok(now)
    }

    /// Transition to `cancelled`; same rules as [`Task::finish`]
    pub fn cancel(&self) -> std::result::Result<DateTime<Utc>, TaskStatus> {
        self.finish(TaskStatus::Cancelled, None)
    }

    /// Record that delivering the interrupt to a cancelled task failed
    pub fn record_interrupt_failure(&self, detail: impl Into<String>) {
        let mut state = self.state.lock();
        if state.status == TaskStatus::Cancelled && state.error.is_none() {
            state.error = Some(detail.into());
        }
    }

    /// Full point-in-time view
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        let duration_ms = state
            .completed_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0));

        TaskSnapshot {
            task_id: self.id,
            command: self.command.clone(),
            working_directory: self.working_directory.clone(),
            status: state.status,
            output: state.output.clone(),
            started_at: self.started_at,
            completed_at: state.completed_at,
            duration_ms,
            error: state.error.clone(),
        }
    }

    /// Listing view with the command cut to `preview_len` characters
    pub fn summary(&self, preview_len: usize) -> TaskSummary {
        let state = self.state.lock();
        TaskSummary {
            task_id: self.id,
            command_preview: preview(&self.command, preview_len),
            status: state.status,
            started_at: self.started_at,
            completed_at: state.completed_at,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("working_directory", &self.working_directory)
            .field("status", &state.status)
            .field("output_len", &state.output.len())
            .field("channel", &self.channel.id())
            .finish()
    }
}

/// First `len` characters of `command`, with `...` when cut
fn preview(command: &str, len: usize) -> String {
    match command.char_indices().nth(len) {
        Some((cut, _)) => format!("{}...", &command[..cut]),
        None => command.to_string(),
    }
}

/// Snapshot returned by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    pub status: TaskStatus,
    pub output: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Only present once terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One entry of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub command_preview: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
