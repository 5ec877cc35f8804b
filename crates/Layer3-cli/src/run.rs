//! One-shot mode: submit a single command and follow it to the end
//!
//! Output is relayed by polling `status`, exactly as a remote caller would.

use relay_task::{TaskManager, TaskStatus};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Run `command` and stream its output into `out` until it is terminal.
///
/// When `interrupt` resolves the task is cancelled; polling continues
/// until the cancellation is visible.
pub async fn run_once<W, F>(
    manager: &TaskManager,
    command: &str,
    working_directory: Option<&str>,
    poll: Duration,
    mut out: W,
    interrupt: F,
) -> anyhow::Result<TaskStatus>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let receipt = manager.submit(command, working_directory)?;
    let id = receipt.task_id.to_string();
    info!("Running task {}", id);

    let mut ticker = tokio::time::interval(poll);
    tokio::pin!(interrupt);
    let mut interrupted = false;
    let mut printed = 0usize;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut interrupt, if !interrupted => {
                interrupted = true;
                let reply = manager.cancel(&id);
                info!("Interrupt requested for {}: {:?}", id, reply);
            }
        }

        let Some(snapshot) = manager.status(&id).snapshot().cloned() else {
            anyhow::bail!("task {} disappeared from the registry", id);
        };

        // Output only grows, so the previous length is a char boundary
        if snapshot.output.len() > printed {
            out.write_all(snapshot.output[printed..].as_bytes()).await?;
            out.flush().await?;
            printed = snapshot.output.len();
        }

        if snapshot.status.is_terminal() {
            if let Some(error) = &snapshot.error {
                warn!("Task {} {}: {}", id, snapshot.status, error);
            }
            info!(
                "{} Task {} {} after {}ms",
                snapshot.status.symbol(),
                id,
                snapshot.status,
                snapshot.duration_ms.unwrap_or_default()
            );
            return Ok(snapshot.status);
        }
    }
}
