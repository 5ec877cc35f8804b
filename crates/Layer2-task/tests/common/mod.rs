//! Scripted in-memory surface for deterministic lifecycle tests
//!
//! Tests decide when a channel becomes ready, what it prints, when its
//! output ends and whether the stream faults.

#![allow(dead_code)]

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use relay_foundation::{Error, Result};
use relay_task::{
    ChannelId, ExecutionChannel, ExecutionSurface, OutputStream, SurfaceEvent, SurfaceEvents,
    TaskManager, TaskManagerConfig, TaskSnapshot,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub struct ScriptedSurface {
    events: SurfaceEvents,
    available: bool,
    ready_on_acquire: bool,
    channels: Mutex<Vec<Arc<ScriptedChannel>>>,
}

impl ScriptedSurface {
    /// Channels are ready as soon as they are acquired
    pub fn ready() -> Arc<Self> {
        Arc::new(Self::build(true, true))
    }

    /// Channels wait for an explicit `mark_ready`
    pub fn not_ready() -> Arc<Self> {
        Arc::new(Self::build(true, false))
    }

    /// `acquire` always fails
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::build(false, false))
    }

    fn build(available: bool, ready_on_acquire: bool) -> Self {
        Self {
            events: SurfaceEvents::new(),
            available,
            ready_on_acquire,
            channels: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> &SurfaceEvents {
        &self.events
    }

    pub fn channel(&self, index: usize) -> Arc<ScriptedChannel> {
        Arc::clone(&self.channels.lock()[index])
    }

    pub fn last_channel(&self) -> Arc<ScriptedChannel> {
        let channels = self.channels.lock();
        Arc::clone(channels.last().expect("no channel acquired"))
    }

    pub fn mark_ready(&self, channel: &ScriptedChannel) {
        channel.ready.store(true, Ordering::SeqCst);
        self.events.ready(channel.id);
    }

    pub fn close(&self, channel: &ScriptedChannel) {
        self.events.closed(channel.id);
    }
}

impl ExecutionSurface for ScriptedSurface {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn acquire(&self) -> Result<Arc<dyn ExecutionChannel>> {
        if !self.available {
            return Err(Error::SurfaceUnavailable("scripted surface is offline".into()));
        }

        let channel = Arc::new(ScriptedChannel::new(self.ready_on_acquire));
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }
}

pub struct ScriptedChannel {
    id: ChannelId,
    ready: AtomicBool,
    feed_tx: Mutex<Option<mpsc::UnboundedSender<Result<String>>>>,
    feed_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<String>>>>,
    command: Mutex<Option<String>>,
    interrupts: AtomicUsize,
    fail_interrupts: AtomicBool,
}

impl ScriptedChannel {
    fn new(ready: bool) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: ChannelId::next(),
            ready: AtomicBool::new(ready),
            feed_tx: Mutex::new(Some(tx)),
            feed_rx: Mutex::new(Some(rx)),
            command: Mutex::new(None),
            interrupts: AtomicUsize::new(0),
            fail_interrupts: AtomicBool::new(false),
        }
    }

    pub fn emit(&self, chunk: &str) {
        if let Some(tx) = self.feed_tx.lock().as_ref() {
            let _ = tx.send(Ok(chunk.to_string()));
        }
    }

    pub fn fault(&self, message: &str) {
        if let Some(tx) = self.feed_tx.lock().as_ref() {
            let _ = tx.send(Err(Error::surface(message)));
        }
    }

    /// End of output
    pub fn end(&self) {
        self.feed_tx.lock().take();
    }

    pub fn fail_interrupts(&self) {
        self.fail_interrupts.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> bool {
        self.command.lock().is_some()
    }

    pub fn command(&self) -> Option<String> {
        self.command.lock().clone()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionChannel for ScriptedChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn run(&self, command: &str) -> Result<OutputStream> {
        let mut rx = self
            .feed_rx
            .lock()
            .take()
            .ok_or_else(|| Error::surface("scripted channel already ran"))?;
        *self.command.lock() = Some(command.to_string());

        Ok(Box::pin(stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }))
    }

    fn signal_interrupt(&self) -> Result<()> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        if self.fail_interrupts.load(Ordering::SeqCst) {
            return Err(Error::surface("interrupt refused"));
        }
        Ok(())
    }
}

pub fn manager_for(surface: &Arc<ScriptedSurface>) -> TaskManager {
    manager_with_timeout(surface, Duration::from_millis(2000))
}

pub fn manager_with_timeout(surface: &Arc<ScriptedSurface>, timeout: Duration) -> TaskManager {
    let surface: Arc<dyn ExecutionSurface> = Arc::clone(surface) as Arc<dyn ExecutionSurface>;
    TaskManager::new(
        surface,
        TaskManagerConfig {
            readiness_timeout: timeout,
            ..TaskManagerConfig::default()
        },
    )
}

/// Wait for a terminal snapshot, failing the test after five seconds
pub async fn finished(manager: &TaskManager, task_id: &str) -> TaskSnapshot {
    manager
        .wait(task_id, Duration::from_secs(5))
        .await
        .expect("task did not finish in time")
}

/// Poll until the task output contains `needle`
pub async fn output_contains(manager: &TaskManager, task_id: &str, needle: &str) -> String {
    for _ in 0..200 {
        if let Some(snapshot) = manager.status(task_id).snapshot() {
            if snapshot.output.contains(needle) {
                return snapshot.output.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("output never contained {:?}", needle);
}
