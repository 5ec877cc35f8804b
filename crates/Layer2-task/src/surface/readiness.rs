//! Readiness handshake
//!
//! A one-shot wait raced against a timer. The broadcast receiver is owned by
//! the wait and dropped on every exit path, so no subscription outlives it.

use super::r#trait::{ExecutionChannel, SurfaceEvent};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// Outcome of waiting for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
    /// Channel or surface went away before becoming ready
    Closed,
}

/// Wait until `channel` reports readiness or `timeout` elapses.
///
/// `events` must be subscribed before calling, otherwise a notification
/// published between the readiness check and the subscription is lost.
pub async fn await_ready(
    channel: &dyn ExecutionChannel,
    mut events: broadcast::Receiver<SurfaceEvent>,
    timeout: Duration,
) -> Readiness {
    if channel.is_ready() {
        return Readiness::Ready;
    }

    let id = channel.id();
    debug!("Waiting up to {:?} for channel {}", timeout, id);

    let wait = async {
        loop {
            match events.recv().await {
                Ok(SurfaceEvent::Ready(ready)) if ready == id => return Readiness::Ready,
                Ok(SurfaceEvent::Closed(closed)) if closed == id => return Readiness::Closed,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Readiness wait for {} lagged by {} events", id, skipped);
                    if channel.is_ready() {
                        return Readiness::Ready;
                    }
                }
                Err(RecvError::Closed) => return Readiness::Closed,
            }
        }
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok(readiness) => readiness,
        Err(_) => {
            debug!("Channel {} not ready after {:?}", id, timeout);
            Readiness::TimedOut
        }
    }
}
