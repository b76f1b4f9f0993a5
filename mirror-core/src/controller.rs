//! The broker context: session lifecycle around the frame [`Broker`].
//!
//! The controller opens and closes mirror windows through a
//! [`WindowManager`], binds sessions, tells the source to start and stop
//! capturing, relays frames and answers status queries. Window or tab
//! removal notifications end the session as if it had been closed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Envelope, Mailbox, MessageBus};
use crate::error::MirrorError;
use crate::message::{ContextId, Message};
use crate::relay::{Broker, SubmitOutcome};

/// URL prefixes of pages that cannot be mirrored.
pub const SYSTEM_PAGE_PREFIXES: &[&str] = &["chrome://", "edge://"];

pub fn is_system_page(url: &str) -> bool {
    SYSTEM_PAGE_PREFIXES.iter().any(|p| url.starts_with(p))
}

// ── Window collaborator ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowOptions {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub focused: bool,
}

/// A created mirror window and the bus context rendering into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHandle {
    pub window_id: u64,
    pub target: ContextId,
}

/// Host window / tab lifecycle.
#[async_trait]
pub trait WindowManager: Send + Sync {
    /// URL of the page hosted by `source`, `None` when it no longer exists.
    async fn source_url(&self, source: ContextId) -> Option<String>;

    async fn create(&self, options: WindowOptions) -> Result<WindowHandle, MirrorError>;

    async fn remove(&self, window_id: u64) -> Result<(), MirrorError>;
}

// ── ControllerConfig ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub mirror_url: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Requested capture rate sent with `startCapture`.
    pub frame_rate: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mirror_url: "mirror.html".into(),
            window_width: 1024,
            window_height: 768,
            frame_rate: 30,
        }
    }
}

// ── MirrorController ─────────────────────────────────────────────

pub struct MirrorController {
    broker: Broker,
    bus: Arc<dyn MessageBus>,
    windows: Arc<dyn WindowManager>,
    config: ControllerConfig,
    window: Option<WindowHandle>,
}

impl MirrorController {
    pub fn new(
        id: ContextId,
        bus: Arc<dyn MessageBus>,
        windows: Arc<dyn WindowManager>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            broker: Broker::new(id, Arc::clone(&bus)),
            bus,
            windows,
            config,
            window: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.broker.id()
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn window(&self) -> Option<WindowHandle> {
        self.window
    }

    pub async fn run(mut self, mut mailbox: Mailbox, cancel: CancellationToken) {
        info!(id = %self.id(), "mirror controller started");
        loop {
            let envelope = tokio::select! {
                _ = cancel.cancelled() => break,
                envelope = mailbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };
            self.handle(envelope).await;
        }
        self.teardown("controller stopped");
        info!(id = %self.id(), "mirror controller stopped");
    }

    /// Apply one message. Every failure is handled here.
    pub async fn handle(&mut self, envelope: Envelope) {
        let Envelope { from, message } = envelope;
        match message {
            Message::OpenMirror { source_id } => {
                let reply = match self.open(source_id).await {
                    Ok(handle) => Message::MirrorOpened {
                        window_id: handle.window_id,
                        target_id: handle.target,
                    },
                    Err(e) => {
                        warn!(source = %source_id, "open mirror failed: {e}");
                        Message::MirrorFailed {
                            error: e.to_string(),
                        }
                    }
                };
                self.reply(from, reply);
            }
            Message::CloseMirror => {
                self.close().await;
                self.reply(from, Message::MirrorClosed);
            }
            Message::FrameUpdate(frame) => {
                if let SubmitOutcome::Rejected(reason) = self.broker.submit(from, frame) {
                    debug!(%from, ?reason, "frame rejected");
                }
            }
            Message::GetFrame => {
                let frame = self.broker.current_frame().cloned();
                self.reply(from, Message::CurrentFrame { frame });
            }
            Message::IsStreaming => {
                let streaming = self.broker.is_streaming();
                self.reply(from, Message::StreamingStatus { streaming });
            }
            Message::GetStats => {
                let stats = self.broker.stats();
                self.reply(from, Message::Stats(stats));
            }
            Message::SetQuality { quality, manual } => self.forward_quality(from, quality, manual),
            Message::CaptureStopped { reason } => {
                match self.broker.session().map(|s| s.check_source(from)) {
                    Some(Ok(())) => {
                        warn!(source = %from, "capture stopped: {reason}");
                        self.broker.deactivate();
                    }
                    Some(Err(e)) => debug!("capture stop ignored: {e}"),
                    None => debug!(%from, "capture stop without a session ignored"),
                }
            }
            Message::WindowRemoved { window_id } => {
                if self.window.is_some_and(|w| w.window_id == window_id) {
                    info!(window_id, "mirror window removed");
                    self.window = None;
                    self.teardown("mirror window closed");
                }
            }
            Message::TabRemoved { tab_id } => {
                let is_target = self.window.is_some_and(|w| w.target == tab_id);
                if is_target || self.current_source() == Some(tab_id) {
                    info!(tab = %tab_id, "mirror tab removed");
                    if is_target {
                        self.window = None;
                    }
                    self.teardown("tab closed");
                }
            }
            Message::MirrorReady => info!(%from, "mirror ready"),
            Message::Unknown => debug!(%from, "unknown action ignored"),
            other => debug!(%from, action = other.action(), "unhandled action"),
        }
    }

    async fn open(&mut self, source: ContextId) -> Result<WindowHandle, MirrorError> {
        let url = self
            .windows
            .source_url(source)
            .await
            .ok_or_else(|| MirrorError::InvalidSource("Tab not found".into()))?;
        if is_system_page(&url) {
            return Err(MirrorError::InvalidSource("Cannot mirror system pages".into()));
        }

        if let Some(previous) = self.current_source().filter(|&s| s != source) {
            info!(%previous, "stopping previous source");
            self.bus.post(self.id(), previous, Message::StopCapture);
        }
        if let Some(old) = self.window.take() {
            self.broker.deactivate();
            if let Err(e) = self.windows.remove(old.window_id).await {
                debug!(window_id = old.window_id, "old mirror window not removed: {e}");
            }
        }

        let handle = self
            .windows
            .create(WindowOptions {
                url: self.config.mirror_url.clone(),
                width: self.config.window_width,
                height: self.config.window_height,
                focused: true,
            })
            .await?;
        info!(%source, %url, window_id = handle.window_id, target = %handle.target, "mirror window created");

        self.window = Some(handle);
        self.broker.begin_session(source, Some(handle.target));
        self.bus.post(
            self.id(),
            source,
            Message::StartCapture {
                target_id: handle.target,
                frame_rate: self.config.frame_rate,
            },
        );
        Ok(handle)
    }

    async fn close(&mut self) {
        self.teardown("mirror closed");
        if let Some(window) = self.window.take() {
            match self.windows.remove(window.window_id).await {
                Ok(()) => info!(window_id = window.window_id, "mirror window closed"),
                Err(e) => warn!(window_id = window.window_id, "error closing window: {e}"),
            }
        }
    }

    /// Stop the source and the session. The last frame stays readable.
    fn teardown(&mut self, why: &str) {
        if let Some(source) = self.current_source() {
            if self.broker.is_streaming() {
                info!(%source, "stream stopped: {why}");
            }
            self.bus.post(self.id(), source, Message::StopCapture);
        }
        self.broker.deactivate();
    }

    fn forward_quality(&self, from: ContextId, quality: u8, manual: bool) {
        let bound = self.broker.session().and_then(|s| s.target());
        match (self.current_source(), bound) {
            (Some(source), Some(target)) if target == from && self.broker.is_streaming() => {
                self.bus
                    .post(self.id(), source, Message::SetQuality { quality, manual });
            }
            _ => debug!(%from, quality, "quality request not from bound target ignored"),
        }
    }

    fn current_source(&self) -> Option<ContextId> {
        self.broker.session().map(|s| s.source())
    }

    fn reply(&self, to: ContextId, message: Message) {
        self.bus.post(self.id(), to, message);
    }
}

// ── Tests ────────────────────────────────────────────────────────
