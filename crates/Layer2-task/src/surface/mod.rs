//! Execution surfaces
//!
//! Provides the backends a task's command can run on:
//! - `PtySurface` - one pseudo-terminal per task, interrupt is a Ctrl-C keystroke
//! - `LocalSurface` - one plain child process per task, interrupt is SIGINT
//!
//! Readiness is announced through [`SurfaceEvents`] and awaited with
//! [`await_ready`].

mod decode;
pub mod local;
pub mod pty;
pub mod readiness;
pub mod r#trait;

pub use local::LocalSurface;
pub use pty::PtySurface;
pub use r#trait::{ChannelId, ExecutionChannel, ExecutionSurface, OutputStream, SurfaceEvent};
pub use readiness::{await_ready, Readiness};

use relay_foundation::{RelayConfig, SurfaceKind};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast channel capacity for surface notifications
const EVENT_CAPACITY: usize = 256;

/// Notification hub shared by a surface and its channels
#[derive(Debug, Clone)]
pub struct SurfaceEvents {
    tx: broadcast::Sender<SurfaceEvent>,
}

impl SurfaceEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub fn publish(&self, event: SurfaceEvent) {
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!("Surface event {:?} delivered to {} subscribers", event, delivered);
    }

    pub fn ready(&self, id: ChannelId) {
        self.publish(SurfaceEvent::Ready(id));
    }

    pub fn closed(&self, id: ChannelId) {
        self.publish(SurfaceEvent::Closed(id));
    }
}

impl Default for SurfaceEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the surface selected by configuration
pub fn build_surface(config: &RelayConfig) -> Arc<dyn ExecutionSurface> {
    match config.surface {
        SurfaceKind::Pty => Arc::new(PtySurface::from_config(config)),
        SurfaceKind::Process => Arc::new(LocalSurface::from_config(config)),
    }
}

/// Shell flag that makes `shell` run a single command string
pub(crate) fn command_flag(shell: &str) -> &'static str {
    let name = std::path::Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell)
        .to_ascii_lowercase();

    match name.as_str() {
        "powershell" | "pwsh" => "-Command",
        "cmd" => "/C",
        _ => "-c",
    }
}
