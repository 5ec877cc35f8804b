//! Task Executor - drives one task from submission to a terminal state
//!
//! Each task runs on its own detached tokio task. Everything that can go
//! wrong inside it, a panic included, ends up as task state; nothing is
//! propagated to the submitter.

use crate::state::TaskStatus;
use crate::surface::{await_ready, ExecutionSurface, Readiness};
use crate::task::Task;
use futures::{FutureExt, StreamExt};
use relay_foundation::{Error, RelayConfig, Result};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long to wait for a channel that is not ready yet
    pub readiness_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: Duration::from_millis(2000),
        }
    }
}

impl From<&RelayConfig> for ExecutorConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            readiness_timeout: config.readiness_timeout(),
        }
    }
}

/// Build the command line actually sent to the channel
///
/// A working directory other than the current one becomes a `cd` prefix;
/// directories containing whitespace are double-quoted.
pub fn effective_command(command: &str, working_directory: Option<&str>) -> String {
    match working_directory.map(str::trim) {
        None | Some("") | Some(".") => command.to_string(),
        Some(dir) if dir.chars().any(char::is_whitespace) => {
            format!("cd \"{}\" && {}", dir, command)
        }
        Some(dir) => format!("cd {} && {}", dir, command),
    }
}

/// Runs tasks against an execution surface
pub struct TaskExecutor {
    surface: Arc<dyn ExecutionSurface>,
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(surface: Arc<dyn ExecutionSurface>, config: ExecutorConfig) -> Self {
        Self { surface, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Start driving `task` in the background
    pub fn spawn(self: &Arc<Self>, task: Arc<Task>) -> JoinHandle<()> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.drive(task).await })
    }

    /// Run to completion and record the outcome on the task
    pub async fn drive(&self, task: Arc<Task>) {
        let id = task.id();
        let outcome = AssertUnwindSafe(self.execute(&task)).catch_unwind().await;

        let (status, detail) = match outcome {
            Ok(Ok(())) => (TaskStatus::Completed, None),
            Ok(Err(e)) => {
                warn!("Task {} failed: {}", id, e);
                (TaskStatus::Failed, Some(e.to_string()))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Executor for task {} panicked: {}", id, message);
                (
                    TaskStatus::Failed,
                    Some(format!("executor panicked: {}", message)),
                )
            }
        };

        match task.finish(status, detail) {
            Ok(_) => info!("Task {} {}", id, status),
            Err(current) => debug!("Task {} already {}; {} not recorded", id, current, status),
        }
    }

    async fn execute(&self, task: &Task) -> Result<()> {
        let channel = Arc::clone(task.channel());

        // Subscribe before the readiness check so no notification is missed
        let events = self.surface.subscribe();
        match await_ready(channel.as_ref(), events, self.config.readiness_timeout).await {
            Readiness::Ready => {}
            other => {
                debug!("Task {} channel {}: {:?}", task.id(), channel.id(), other);
                return Err(Error::SurfaceNotReady);
            }
        }

        let mut status = task.subscribe();
        if task.status().is_terminal() {
            debug!("Task {} left running before start; command skipped", task.id());
            return Ok(());
        }

        let command = effective_command(task.command(), task.working_directory());
        let mut output = channel.run(&command).await?;
        debug!("Task {} streaming from {}", task.id(), channel.id());

        loop {
            tokio::select! {
                chunk = output.next() => match chunk {
                    Some(Ok(text)) => {
                        if !task.append_output(&text) {
                            break;
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
                // Only terminal transitions are ever published
                _ = status.changed() => {
                    debug!("Task {} finished elsewhere; dropping output stream", task.id());
                    break;
                }
            }
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_command_current_dir() {
        assert_eq!(effective_command("ls", None), "ls");
        assert_eq!(effective_command("ls", Some(".")), "ls");
        assert_eq!(effective_command("ls", Some("")), "ls");
    }

    #[test]
    fn test_effective_command_with_dir() {
        assert_eq!(effective_command("make", Some("/src")), "cd /src && make");
        assert_eq!(
            effective_command("make", Some("/my projects/app")),
            "cd \"/my projects/app\" && make"
        );
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_config_from_relay() {
        let config = ExecutorConfig::from(&RelayConfig::default().readiness_timeout_ms(150));
        assert_eq!(config.readiness_timeout, Duration::from_millis(150));
    }
}
