//! Execution surface traits
//!
//! A surface hands out channels; a channel runs exactly one command and
//! exposes its output as a stream.

use async_trait::async_trait;
use futures::stream::BoxStream;
use relay_foundation::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one channel instance, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Allocate the next channel id
    pub fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Notifications published by a surface about its channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Channel can now accept a command
    Ready(ChannelId),

    /// Channel was disposed and will never become ready
    Closed(ChannelId),
}

impl SurfaceEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            SurfaceEvent::Ready(id) | SurfaceEvent::Closed(id) => *id,
        }
    }
}

/// Lazy, finite, non-restartable sequence of output chunks
pub type OutputStream = BoxStream<'static, Result<String>>;

/// A place one command runs and streams output from
#[async_trait]
pub trait ExecutionChannel: Send + Sync {
    /// Channel identity, matched against surface notifications
    fn id(&self) -> ChannelId;

    /// Whether the channel can accept a command right now
    fn is_ready(&self) -> bool;

    /// Start `command` and return its output stream
    async fn run(&self, command: &str) -> Result<OutputStream>;

    /// Best-effort interrupt of whatever is running. A no-op when nothing
    /// has been started.
    fn signal_interrupt(&self) -> Result<()>;
}

/// Execution surface provider - implement to add new backends
pub trait ExecutionSurface: Send + Sync {
    /// Get surface name
    fn name(&self) -> &'static str;

    /// Obtain a fresh channel. Fails only when the surface cannot provide
    /// one at all; a channel that is merely not ready yet is returned.
    fn acquire(&self) -> Result<Arc<dyn ExecutionChannel>>;

    /// Subscribe to readiness notifications
    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;
}
