//! # relay-task
//!
//! Asynchronous command-execution registry for ShellRelay.
//! Accepts long-running commands, hands back an id immediately, runs them
//! out-of-band and keeps their output for later polling.
//!
//! ## Features
//!
//! - Task records with a guarded, monotone state machine
//! - Shared registry with filtered listings
//! - Execution surfaces (PTY, plain process) with a readiness handshake
//! - Detached executors that turn every fault into task state
//! - Best-effort cancellation through the channel's interrupt

pub mod executor;
pub mod manager;
pub mod registry;
pub mod state;
pub mod surface;
pub mod task;

// Task system
pub use executor::{effective_command, ExecutorConfig, TaskExecutor};
pub use manager::{
    CancelReply, Cancelled, NotFound, NotRunning, StatusReply, SubmitReceipt, TaskListing,
    TaskManager, TaskManagerConfig,
};
pub use registry::{RegistryStats, TaskRegistry, DEFAULT_PREVIEW_LENGTH};
pub use state::{TaskFilter, TaskStatus};
pub use task::{Task, TaskId, TaskSnapshot, TaskSummary};

// Execution surfaces
pub use surface::{
    await_ready, build_surface, ChannelId, ExecutionChannel, ExecutionSurface, LocalSurface,
    OutputStream, PtySurface, Readiness, SurfaceEvent, SurfaceEvents,
};
