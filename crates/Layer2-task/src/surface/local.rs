//! Local surface - runs each command as a plain child process
//!
//! Features:
//! - stdout/stderr merged chunk by chunk, in arrival order, so partial
//!   lines (progress output) show up as soon as they are written
//! - Output is decoded leniently; bytes that are not UTF-8 become U+FFFD
//! - Own process group per command (Unix), so an interrupt reaches the
//!   whole pipeline and not just the shell
//! - Interrupt is SIGINT; the command may ignore it
//! - Dropping the output stream kills the shell process

use super::decode::Utf8Decoder;
use super::r#trait::{ChannelId, ExecutionChannel, ExecutionSurface, OutputStream, SurfaceEvent};
use super::{command_flag, SurfaceEvents};
use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_foundation::{Error, RelayConfig, Result};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Bytes read from a pipe at a time
const READ_CHUNK: usize = 4096;

/// Surface that spawns one child process per channel
pub struct LocalSurface {
    /// Shell used to interpret command strings
    shell: String,

    /// Readiness notifications
    events: SurfaceEvents,
}

impl LocalSurface {
    /// Create a surface using the given shell
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            events: SurfaceEvents::new(),
        }
    }

    /// Create from relay configuration
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.resolved_shell())
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }
}

impl Default for LocalSurface {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl ExecutionSurface for LocalSurface {
    fn name(&self) -> &'static str {
        "process"
    }

    fn acquire(&self) -> Result<Arc<dyn ExecutionChannel>> {
        which::which(&self.shell).map_err(|e| {
            Error::SurfaceUnavailable(format!("shell '{}' not found: {}", self.shell, e))
        })?;

        let channel = LocalChannel {
            id: ChannelId::next(),
            shell: self.shell.clone(),
            pid: Mutex::new(None),
            started: AtomicBool::new(false),
        };
        debug!("Acquired process channel {}", channel.id);

        // A process channel is usable immediately
        self.events.ready(channel.id);
        Ok(Arc::new(channel))
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }
}

/// One child process, started at most once
struct LocalChannel {
    id: ChannelId,

    shell: String,

    /// Process id once started (process group leader on Unix)
    pid: Mutex<Option<u32>>,

    started: AtomicBool,
}

#[async_trait]
impl ExecutionChannel for LocalChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn run(&self, command: &str) -> Result<OutputStream> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::surface(format!(
                "channel {} already ran a command",
                self.id
            )));
        }

        let mut cmd = Command::new(&self.shell);
        cmd.arg(command_flag(&self.shell))
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::surface(format!("Failed to spawn process: {}", e)))?;

        *self.pid.lock() = child.id();
        info!(
            "Channel {} started process {:?}: {}",
            self.id,
            child.id(),
            command
        );

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::surface("stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::surface("stderr was not captured"))?;

        let id = self.id;
        let output = stream! {
            let mut out_buf = [0u8; READ_CHUNK];
            let mut err_buf = [0u8; READ_CHUNK];
            // One decoder per pipe; a sequence split on stdout must not be
            // completed by stderr bytes
            let mut out_text = Utf8Decoder::default();
            let mut err_text = Utf8Decoder::default();
            let mut out_open = true;
            let mut err_open = true;

            while out_open || err_open {
                let (from_stdout, read) = tokio::select! {
                    read = stdout.read(&mut out_buf), if out_open => (true, read),
                    read = stderr.read(&mut err_buf), if err_open => (false, read),
                };

                let text = match read {
                    Ok(0) if from_stdout => {
                        out_open = false;
                        out_text.finish()
                    }
                    Ok(0) => {
                        err_open = false;
                        err_text.finish()
                    }
                    Ok(n) if from_stdout => out_text.push(&out_buf[..n]),
                    Ok(n) => err_text.push(&err_buf[..n]),
                    Err(e) => {
                        yield Err(Error::surface(format!("Failed to read output of {}: {}", id, e)));
                        return;
                    }
                };

                if !text.is_empty() {
                    yield Ok(text);
                }
            }

            match child.wait().await {
                Ok(status) => debug!("Channel {} process exited: {}", id, status),
                Err(e) => warn!("Channel {} failed to reap process: {}", id, e),
            }
        };

        Ok(Box::pin(output))
    }

    fn signal_interrupt(&self) -> Result<()> {
        let pid = *self.pid.lock();
        match pid {
            Some(pid) => send_interrupt(pid),
            None => {
                debug!("Channel {} has nothing running; interrupt ignored", self.id);
                Ok(())
            }
        }
    }
}

#[cfg(unix)]
fn send_interrupt(pid: u32) -> Result<()> {
    let pgid = i32::try_from(pid)
        .map_err(|_| Error::surface(format!("process id {} out of range", pid)))?;

    // Negative pid addresses the process group created at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGINT) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone
        return Ok(());
    }
    Err(Error::surface(format!("Failed to send SIGINT: {}", err)))
}

#[cfg(not(unix))]
fn send_interrupt(_pid: u32) -> Result<()> {
    Err(Error::surface("interrupt is not supported on this platform"))
}
