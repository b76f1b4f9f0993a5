//! The mirror window's event loop.
//!
//! A [`MirrorView`] owns a [`DisplayRenderer`] and multiplexes:
//!
//! | Source | Effect |
//! |--------|--------|
//! | bus mailbox | `displayFrame` → pending frame, `streamingStatus` → status |
//! | controls | pause, fullscreen, fit/fill, manual quality, resize |
//! | animation clock | start a decode if a frame is pending |
//! | in-flight decode | swap in the painted canvas, adapt quality, report it |
//! | status poll | `isStreaming` to the broker every few seconds |
//!
//! State is published as a [`ViewSnapshot`] on a watch channel.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::OptionFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{Envelope, Mailbox, MessageBus};
use crate::display::drops::{DropHealth, DropStats};
use crate::display::layout::DisplayMode;
use crate::display::renderer::{DisplayRenderer, PaintedFrame, RenderOutcome, RendererConfig};
use crate::error::MirrorError;
use crate::message::{ContextId, Message};
use crate::quality::Quality;

// ── Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub renderer: RendererConfig,
    /// Animation clock period.
    pub frame_interval: Duration,
    /// How often the broker is asked whether the stream is still live.
    pub status_poll: Duration,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            renderer: RendererConfig::default(),
            frame_interval: Duration::from_millis(16),
            status_poll: Duration::from_secs(5),
        }
    }
}

// ── Controls ─────────────────────────────────────────────────────

/// User actions on the mirror window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    TogglePause,
    ToggleFullscreen,
    ExitFullscreen,
    SetMode(DisplayMode),
    SetQuality(Quality),
    Resize { width: u32, height: u32 },
}

/// Keyboard shortcut for `key`, named as in DOM `KeyboardEvent.key`.
pub fn key_binding(key: &str) -> Option<Control> {
    match key {
        "f" | "F" => Some(Control::ToggleFullscreen),
        " " => Some(Control::TogglePause),
        "Escape" => Some(Control::ExitFullscreen),
        _ => None,
    }
}

// ── Status ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MirrorStatus {
    #[default]
    Initializing,
    Connected,
    Paused,
    StreamEnded,
}

impl MirrorStatus {
    pub fn text(self) -> &'static str {
        match self {
            MirrorStatus::Initializing => "Initializing...",
            MirrorStatus::Connected => "Connected",
            MirrorStatus::Paused => "Paused",
            MirrorStatus::StreamEnded => "Stream Ended",
        }
    }
}

impl fmt::Display for MirrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Observable view state.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot {
    pub status: MirrorStatus,
    pub paused: bool,
    pub fullscreen: bool,
    pub mode: DisplayMode,
    pub quality: Quality,
    pub fps: f64,
    pub drops: DropStats,
    pub health: DropHealth,
    pub painted: u64,
    pub last_sequence: Option<u64>,
    pub width: u32,
    pub height: u32,
}

/// Caller side of a running view.
#[derive(Clone)]
pub struct ViewHandle {
    pub controls: mpsc::Sender<Control>,
    pub snapshot: watch::Receiver<ViewSnapshot>,
}

// ── MirrorView ───────────────────────────────────────────────────

type DecodeTask = JoinHandle<Result<PaintedFrame, MirrorError>>;

pub struct MirrorView {
    id: ContextId,
    broker: ContextId,
    bus: Arc<dyn MessageBus>,
    config: ViewConfig,
    renderer: DisplayRenderer,
    status: MirrorStatus,
    fullscreen: bool,
    receiving: bool,
    controls: mpsc::Receiver<Control>,
    snapshot: watch::Sender<ViewSnapshot>,
}

impl MirrorView {
    /// Create a view living at bus address `id`, fed by `broker`.
    pub fn new(
        id: ContextId,
        broker: ContextId,
        bus: Arc<dyn MessageBus>,
        config: ViewConfig,
    ) -> (Self, ViewHandle) {
        let renderer = DisplayRenderer::new(config.renderer.clone());
        let (controls_tx, controls_rx) = mpsc::channel(32);
        let (snapshot_tx, snapshot_rx) = watch::channel(ViewSnapshot {
            status: MirrorStatus::Initializing,
            paused: false,
            fullscreen: false,
            mode: renderer.mode(),
            quality: renderer.quality(),
            fps: 0.0,
            drops: DropStats::default(),
            health: DropHealth::Healthy,
            painted: 0,
            last_sequence: None,
            width: renderer.canvas().width(),
            height: renderer.canvas().height(),
        });

        let view = Self {
            id,
            broker,
            bus,
            config,
            renderer,
            status: MirrorStatus::Initializing,
            fullscreen: false,
            receiving: false,
            controls: controls_rx,
            snapshot: snapshot_tx,
        };
        let handle = ViewHandle {
            controls: controls_tx,
            snapshot: snapshot_rx,
        };
        (view, handle)
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Run until `cancel` fires or the mailbox closes.
    pub async fn run(mut self, mut mailbox: Mailbox, cancel: CancellationToken) {
        info!(id = %self.id, "mirror view started");
        self.bus.post(self.id, self.broker, Message::MirrorReady);

        let mut frame_clock = interval(self.config.frame_interval);
        frame_clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let poll_every = self.config.status_poll;
        let mut status_poll = interval_at(Instant::now() + poll_every, poll_every);
        status_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: Option<(u64, DecodeTask)> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                envelope = mailbox.recv() => match envelope {
                    Some(envelope) => self.handle_message(envelope),
                    None => break,
                },

                Some(control) = self.controls.recv() => self.apply(control),

                _ = frame_clock.tick(), if in_flight.is_none() => {
                    if let Some(job) = self.renderer.begin_decode() {
                        let epoch = job.epoch;
                        let task = tokio::task::spawn_blocking(move || job.run());
                        in_flight = Some((epoch, task));
                    }
                }

                Some(joined) = OptionFuture::from(in_flight.as_mut().map(|(_, task)| task)) => {
                    let epoch = in_flight.take().map(|(epoch, _)| epoch).unwrap_or_default();
                    let result = joined.unwrap_or_else(|e| Err(MirrorError::from(e)));
                    self.on_decoded(epoch, result);
                }

                _ = status_poll.tick() => {
                    self.bus.post(self.id, self.broker, Message::IsStreaming);
                }
            }
            self.publish();
        }

        if let Some((_, task)) = in_flight {
            task.abort();
        }
        info!(id = %self.id, "mirror view stopped");
    }

    fn handle_message(&mut self, envelope: Envelope) {
        let Envelope { from, message } = envelope;
        match message {
            Message::DisplayFrame(frame) => {
                if from != self.broker || frame.target_id != self.id {
                    debug!(%from, target = %frame.target_id, "frame not meant for this view");
                    return;
                }
                self.renderer.receive(&frame);
                if !self.receiving {
                    self.receiving = true;
                    info!(id = %self.id, "receiving frames");
                    if !self.renderer.is_paused() {
                        self.status = MirrorStatus::Connected;
                    }
                }
            }
            Message::StreamingStatus { streaming } => {
                if !streaming && self.receiving {
                    self.receiving = false;
                    self.status = MirrorStatus::StreamEnded;
                    info!(id = %self.id, "stream ended");
                }
            }
            other => debug!(%from, action = other.action(), "ignored by mirror view"),
        }
    }

    fn on_decoded(&mut self, epoch: u64, result: Result<PaintedFrame, MirrorError>) {
        if let RenderOutcome::Painted(Some(quality)) = self.renderer.finish_decode(epoch, result) {
            self.bus.post(
                self.id,
                self.broker,
                Message::SetQuality {
                    quality: quality.percent(),
                    manual: false,
                },
            );
        }
    }

    fn apply(&mut self, control: Control) {
        debug!(?control, "control");
        match control {
            Control::TogglePause => {
                let paused = self.renderer.toggle_pause();
                self.status = if paused {
                    MirrorStatus::Paused
                } else if self.receiving {
                    MirrorStatus::Connected
                } else if self.status == MirrorStatus::Paused {
                    MirrorStatus::Initializing
                } else {
                    self.status
                };
            }
            Control::ToggleFullscreen => self.fullscreen = !self.fullscreen,
            Control::ExitFullscreen => self.fullscreen = false,
            Control::SetMode(mode) => self.renderer.set_mode(mode),
            Control::SetQuality(quality) => {
                info!("quality set to {quality}");
                self.renderer.set_quality(quality);
                self.bus.post(
                    self.id,
                    self.broker,
                    Message::SetQuality {
                        quality: quality.percent(),
                        manual: true,
                    },
                );
            }
            Control::Resize { width, height } => self.renderer.resize(width, height),
        }
    }

    fn publish(&mut self) {
        let drops = self.renderer.drop_stats();
        let snapshot = ViewSnapshot {
            status: self.status,
            paused: self.renderer.is_paused(),
            fullscreen: self.fullscreen,
            mode: self.renderer.mode(),
            quality: self.renderer.quality(),
            fps: self.renderer.fps(),
            drops,
            health: drops.health(),
            painted: self.renderer.painted(),
            last_sequence: self.renderer.last_sequence(),
            width: self.renderer.canvas().width(),
            height: self.renderer.canvas().height(),
        };
        self.snapshot.send_replace(snapshot);
    }
}

// ── Tests ────────────────────────────────────────────────────────
