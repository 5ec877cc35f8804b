//! PTY surface - runs each command inside its own pseudo-terminal
//!
//! Uses portable-pty for cross-platform PTY support. This is the closest
//! model of an interactive terminal panel:
//! - The channel is ready as soon as the PTY is open
//! - Output is read on a blocking thread and forwarded over an mpsc channel
//! - Multi-byte UTF-8 sequences split across reads are reassembled and
//!   invalid bytes become U+FFFD
//! - ANSI escape sequences are stripped (configurable)
//! - Interrupt is the Ctrl-C keystroke written to the terminal
//!
//! If the consumer stops reading early (cancellation), the reader thread
//! keeps draining the terminal so the command never blocks on a full PTY
//! buffer, and reaps the child once it exits. Once the child is reaped the
//! master, reader and writer are all closed.

use super::decode::Utf8Decoder;
use super::r#trait::{ChannelId, ExecutionChannel, ExecutionSurface, OutputStream, SurfaceEvent};
use super::{command_flag, SurfaceEvents};
use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtyPair, PtySize};
use relay_foundation::{Error, PtySettings, RelayConfig, Result};
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Chunks buffered between the reader thread and the stream
const CHUNK_BUFFER: usize = 64;

/// ETX, what a terminal sends for Ctrl-C
const INTERRUPT_KEY: u8 = 0x03;

/// PTY surface configuration
#[derive(Debug, Clone)]
pub struct PtySurfaceConfig {
    /// Shell to use
    pub shell: String,

    /// PTY size
    pub size: PtySettings,

    /// Strip ANSI escape sequences from output
    pub strip_ansi: bool,
}

impl From<&RelayConfig> for PtySurfaceConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            shell: config.resolved_shell(),
            size: config.pty,
            strip_ansi: config.strip_ansi,
        }
    }
}

/// Surface that opens one pseudo-terminal per channel
pub struct PtySurface {
    config: PtySurfaceConfig,
    events: SurfaceEvents,
}

impl PtySurface {
    pub fn new(config: PtySurfaceConfig) -> Self {
        Self {
            config,
            events: SurfaceEvents::new(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(PtySurfaceConfig::from(config))
    }

    fn pty_size(&self) -> PtySize {
        PtySize {
            rows: self.config.size.rows,
            cols: self.config.size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl ExecutionSurface for PtySurface {
    fn name(&self) -> &'static str {
        "pty"
    }

    fn acquire(&self) -> Result<Arc<dyn ExecutionChannel>> {
        which::which(&self.config.shell).map_err(|e| {
            Error::SurfaceUnavailable(format!("shell '{}' not found: {}", self.config.shell, e))
        })?;

        let pair = native_pty_system()
            .openpty(self.pty_size())
            .map_err(|e| Error::SurfaceUnavailable(format!("Failed to open PTY: {}", e)))?;

        let channel = PtyChannel {
            id: ChannelId::next(),
            shell: self.config.shell.clone(),
            strip_ansi: self.config.strip_ansi,
            pair: Mutex::new(Some(pair)),
            master: Arc::new(Mutex::new(None)),
            writer: Arc::new(Mutex::new(None)),
        };
        debug!("Opened PTY channel {}", channel.id);

        self.events.ready(channel.id);
        Ok(Arc::new(channel))
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }
}

/// PTY channel state
struct PtyChannel {
    id: ChannelId,

    shell: String,

    strip_ansi: bool,

    /// PTY pair, taken when the command starts
    pair: Mutex<Option<PtyPair>>,

    /// Master side, open while the command runs
    master: SharedMaster,

    /// Terminal input, used for the interrupt keystroke
    writer: SharedWriter,
}

type SharedMaster = Arc<Mutex<Option<Box<dyn MasterPty + Send>>>>;
type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

#[async_trait]
impl ExecutionChannel for PtyChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn run(&self, command: &str) -> Result<OutputStream> {
        let pair = self.pair.lock().take().ok_or_else(|| {
            Error::surface(format!("channel {} already ran a command", self.id))
        })?;

        let mut cmd = CommandBuilder::new(&self.shell);
        cmd.arg(command_flag(&self.shell));
        cmd.arg(command);
        cmd.env("TERM", "xterm-256color");
        // CommandBuilder falls back to the home directory otherwise
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| Error::surface(format!("Failed to spawn PTY command: {}", e)))?;
        // Only the child holds the slave now, so EOF arrives when it exits
        drop(pair.slave);

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::surface(format!("Failed to clone PTY reader: {}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::surface(format!("Failed to open PTY writer: {}", e)))?;

        *self.writer.lock() = Some(writer);
        *self.master.lock() = Some(pair.master);
        info!("Channel {} started PTY command: {}", self.id, command);

        let (tx, mut rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(CHUNK_BUFFER);
        let id = self.id;
        let master = Arc::clone(&self.master);
        let writer = Arc::clone(&self.writer);

        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            let mut consumer_gone = false;

            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if !consumer_gone && tx.blocking_send(Ok(buf[..n].to_vec())).is_err() {
                            debug!("Channel {} output no longer consumed; draining", id);
                            consumer_gone = true;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) if is_pty_eof(&e) => break,
                    Err(e) => {
                        if !consumer_gone {
                            let _ = tx.blocking_send(Err(e));
                        }
                        break;
                    }
                }
            }

            match child.wait() {
                Ok(status) => debug!("Channel {} PTY command exited: {:?}", id, status),
                Err(e) => warn!("Channel {} failed to reap PTY command: {}", id, e),
            }

            // Close every handle on the terminal before the stream ends, so a
            // finished task holds no descriptors
            drop(reader);
            writer.lock().take();
            master.lock().take();
            debug!("Channel {} released its PTY", id);
            drop(tx);
        });

        let strip_ansi = self.strip_ansi;
        let output = stream! {
            let mut decoder = Utf8Decoder::default();

            while let Some(chunk) = rx.recv().await {
                match chunk {
                    Ok(bytes) => {
                        let text = decoder.push(&bytes);
                        if !text.is_empty() {
                            yield Ok(clean_output(&text, strip_ansi));
                        }
                    }
                    Err(e) => {
                        yield Err(Error::surface(format!("PTY read failed on {}: {}", id, e)));
                        return;
                    }
                }
            }

            let tail = decoder.finish();
            if !tail.is_empty() {
                yield Ok(clean_output(&tail, strip_ansi));
            }
        };

        Ok(Box::pin(output))
    }

    fn signal_interrupt(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        match writer.as_mut() {
            Some(w) => w
                .write_all(&[INTERRUPT_KEY])
                .and_then(|_| w.flush())
                .map_err(|e| Error::surface(format!("Failed to send interrupt: {}", e))),
            None => {
                // Never started, or already finished. An unused PTY is
                // closed here since the command will not run now.
                if self.pair.lock().take().is_some() {
                    debug!("Channel {} closed its unused PTY", self.id);
                }
                debug!("Channel {} has nothing running; interrupt ignored", self.id);
                Ok(())
            }
        }
    }
}

/// Linux reports EIO on the master once every slave handle is closed
#[cfg(unix)]
fn is_pty_eof(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EIO)
}

#[cfg(not(unix))]
fn is_pty_eof(_e: &std::io::Error) -> bool {
    false
}

/// Normalise terminal output for the task buffer
fn clean_output(text: &str, strip_ansi: bool) -> String {
    let text = if strip_ansi {
        strip_ansi_escapes::strip_str(text)
    } else {
        text.to_string()
    };
    text.replace("\r\n", "\n")
}
