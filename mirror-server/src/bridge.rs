//! Receiver bridge: HTTP receiver slots as mirror "windows".
//!
//! The bridge is the [`WindowManager`] the controller opens mirrors
//! through. Each window is a slot context on the bus; frames pushed to the
//! current slot become the latest frame served to polling receivers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use mirror_core::bus::{Envelope, LocalBus, Mailbox, MessageBus};
use mirror_core::controller::{WindowHandle, WindowManager, WindowOptions};
use mirror_core::display::MirrorStatus;
use mirror_core::error::MirrorError;
use mirror_core::frame::FrameEnvelope;
use mirror_core::message::{ContextId, Message};

/// Slot contexts are numbered from here up.
pub const SLOT_CONTEXT_BASE: u64 = 10_000;

/// How often a slot asks the broker whether the stream is live.
pub const STATUS_POLL: Duration = Duration::from_secs(5);

struct Slot {
    target: ContextId,
    task: JoinHandle<()>,
}

pub struct ReceiverBridge {
    bus: Arc<LocalBus>,
    broker: ContextId,
    status_poll: Duration,
    next_window: AtomicU64,
    slots: Mutex<HashMap<u64, Slot>>,
    sources: Mutex<HashMap<ContextId, String>>,
    latest: watch::Sender<Option<FrameEnvelope>>,
    status: watch::Sender<MirrorStatus>,
}

impl ReceiverBridge {
    pub fn new(bus: Arc<LocalBus>, broker: ContextId) -> Self {
        Self::with_status_poll(bus, broker, STATUS_POLL)
    }

    pub fn with_status_poll(bus: Arc<LocalBus>, broker: ContextId, status_poll: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        let (status, _) = watch::channel(MirrorStatus::Initializing);
        Self {
            bus,
            broker,
            status_poll,
            next_window: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
            sources: Mutex::new(HashMap::new()),
            latest,
            status,
        }
    }

    /// Make `source` mirrorable, hosting the page at `url`.
    pub fn register_source(&self, source: ContextId, url: impl Into<String>) {
        lock(&self.sources).insert(source, url.into());
    }

    pub fn unregister_source(&self, source: ContextId) {
        lock(&self.sources).remove(&source);
    }

    /// Latest frame pushed to any open slot.
    pub fn latest_frame(&self) -> Option<FrameEnvelope> {
        self.latest.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<FrameEnvelope>> {
        self.latest.subscribe()
    }

    pub fn status(&self) -> MirrorStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<MirrorStatus> {
        self.status.subscribe()
    }

    pub fn open_slots(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Stop every slot task.
    pub fn close_all(&self) {
        for (_, slot) in lock(&self.slots).drain() {
            slot.task.abort();
            self.bus.unregister(slot.target);
        }
    }
}

#[async_trait]
impl WindowManager for ReceiverBridge {
    async fn source_url(&self, source: ContextId) -> Option<String> {
        lock(&self.sources).get(&source).cloned()
    }

    async fn create(&self, options: WindowOptions) -> Result<WindowHandle, MirrorError> {
        let window_id = self.next_window.fetch_add(1, Ordering::SeqCst) + 1;
        let target = ContextId(SLOT_CONTEXT_BASE + window_id);
        let mailbox = self.bus.register(target);

        let worker = SlotWorker {
            target,
            broker: self.broker,
            bus: Arc::clone(&self.bus),
            latest: self.latest.clone(),
            status: self.status.clone(),
            status_poll: self.status_poll,
        };
        self.status.send_replace(MirrorStatus::Initializing);
        let task = tokio::spawn(worker.run(mailbox));
        lock(&self.slots).insert(window_id, Slot { target, task });

        info!(window_id, %target, url = %options.url, "receiver slot opened");
        Ok(WindowHandle { window_id, target })
    }

    async fn remove(&self, window_id: u64) -> Result<(), MirrorError> {
        let slot = lock(&self.slots)
            .remove(&window_id)
            .ok_or_else(|| MirrorError::Other(format!("no window {window_id}")))?;
        slot.task.abort();
        self.bus.unregister(slot.target);
        info!(window_id, "receiver slot closed");
        Ok(())
    }
}

impl Drop for ReceiverBridge {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── SlotWorker ───────────────────────────────────────────────────

struct SlotWorker {
    target: ContextId,
    broker: ContextId,
    bus: Arc<LocalBus>,
    latest: watch::Sender<Option<FrameEnvelope>>,
    status: watch::Sender<MirrorStatus>,
    status_poll: Duration,
}

impl SlotWorker {
    async fn run(self, mut mailbox: Mailbox) {
        self.bus.post(self.target, self.broker, Message::MirrorReady);
        let mut poll = interval_at(Instant::now() + self.status_poll, self.status_poll);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut receiving = false;

        loop {
            tokio::select! {
                envelope = mailbox.recv() => match envelope {
                    Some(envelope) => self.handle(envelope, &mut receiving),
                    None => break,
                },
                _ = poll.tick() => self.bus.post(self.target, self.broker, Message::IsStreaming),
            }
        }
        debug!(target = %self.target, "slot worker exited");
    }

    fn handle(&self, envelope: Envelope, receiving: &mut bool) {
        let Envelope { from, message } = envelope;
        match message {
            Message::DisplayFrame(frame) if from == self.broker && frame.target_id == self.target => {
                if !*receiving {
                    *receiving = true;
                    self.status.send_replace(MirrorStatus::Connected);
                }
                self.latest.send_replace(Some(frame));
            }
            Message::StreamingStatus { streaming: false } if *receiving => {
                *receiving = false;
                self.status.send_replace(MirrorStatus::StreamEnded);
            }
            other => debug!(%from, action = other.action(), "ignored by receiver slot"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
