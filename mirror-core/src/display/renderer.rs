//! Consumer-side decode + paint pipeline.
//!
//! The renderer holds at most one pending frame (latest wins), decodes it
//! on the next animation tick unless a decode is already in flight or
//! playback is paused, paints it onto the canvas and feeds the quality
//! adapter.
//!
//! Decoding is split into [`begin_decode`](DisplayRenderer::begin_decode)
//! and [`finish_decode`](DisplayRenderer::finish_decode) so the caller
//! can run the decode and paint off the loop. Each job carries the session
//! epoch it was started in; results that land after a session reset are
//! ignored.
//!
//! The adapter starts each session from the quality the producer tags its
//! frames with, so a step down is always relative to what is being
//! encoded.

use tracing::{debug, info, warn};

use crate::display::canvas::Canvas;
use crate::display::decoder::decode_jpeg;
use crate::display::drops::{DropDetector, DropStats};
use crate::display::layout::{DisplayMode, Placement};
use crate::display::meter::FrameRateMeter;
use crate::error::MirrorError;
use crate::frame::{Frame, FrameEnvelope};
use crate::message::ContextId;
use crate::quality::{Quality, QualityAdapter};

// ── Config ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub mode: DisplayMode,
    pub initial_quality: Quality,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            mode: DisplayMode::Fit,
            initial_quality: Quality::DEFAULT,
        }
    }
}

// ── DecodeJob ────────────────────────────────────────────────────

/// A frame taken for decoding, with everything needed to paint it.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub epoch: u64,
    pub frame: Frame,
    pub mode: DisplayMode,
    pub width: u32,
    pub height: u32,
}

impl DecodeJob {
    /// Decode the payload and paint it onto a fresh canvas.
    ///
    /// CPU-bound; async callers run it on the blocking pool.
    pub fn run(&self) -> Result<PaintedFrame, MirrorError> {
        let image = decode_jpeg(&self.frame.data)?;
        let mut canvas = Canvas::new(self.width, self.height);
        let placement = canvas.paint(&image, self.mode);
        Ok(PaintedFrame { canvas, placement })
    }
}

/// Result of a finished [`DecodeJob`].
pub struct PaintedFrame {
    pub canvas: Canvas,
    pub placement: Placement,
}

/// What a finished decode did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Painted. Carries the new quality when the adapter lowered it.
    Painted(Option<Quality>),
    /// Payload was corrupt; counted as a dropped frame.
    Dropped,
    /// Result belonged to a previous session.
    Stale,
}

// ── DisplayRenderer ──────────────────────────────────────────────

pub struct DisplayRenderer {
    /// Target the current session's frames are addressed to.
    session: Option<ContextId>,
    epoch: u64,
    pending: Option<Frame>,
    decoding: bool,
    /// Adapter has taken the producer's quality this session.
    seeded: bool,
    paused: bool,
    mode: DisplayMode,
    canvas: Canvas,
    detector: DropDetector,
    adapter: QualityAdapter,
    meter: FrameRateMeter,
    painted: u64,
    last_placement: Option<Placement>,
}

impl DisplayRenderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            session: None,
            epoch: 0,
            pending: None,
            decoding: false,
            seeded: false,
            paused: false,
            mode: config.mode,
            canvas: Canvas::new(config.width, config.height),
            detector: DropDetector::new(),
            adapter: QualityAdapter::new(config.initial_quality),
            meter: FrameRateMeter::new(),
            painted: 0,
            last_placement: None,
        }
    }

    /// Start over for a new session: drop counters, pending frame and any
    /// in-flight decode are discarded. Quality is kept until the first
    /// tagged frame reseeds it.
    pub fn begin_session(&mut self, target: ContextId) {
        info!(%target, "display session started");
        self.session = Some(target);
        self.epoch += 1;
        self.pending = None;
        self.decoding = false;
        self.seeded = false;
        self.detector.reset();
        self.meter.reset();
        self.painted = 0;
    }

    /// Accept a pushed frame.
    ///
    /// A frame addressed to a different target than the current session
    /// starts a new session first.
    pub fn receive(&mut self, envelope: &FrameEnvelope) {
        if self.session != Some(envelope.target_id) {
            self.begin_session(envelope.target_id);
        }
        if !self.seeded {
            if let Some(producer) = envelope.quality {
                self.adapter.seed(producer);
                self.seeded = true;
            }
        }
        self.detector.observe(envelope.sequence_number);
        if let Some(old) = self.pending.replace(envelope.to_frame()) {
            debug!(seq = old.sequence_number, "pending frame superseded");
        }
    }

    /// Take the pending frame for decoding, if the loop may render now.
    pub fn begin_decode(&mut self) -> Option<DecodeJob> {
        if self.paused || self.decoding {
            return None;
        }
        let frame = self.pending.take()?;
        self.decoding = true;
        Some(DecodeJob {
            epoch: self.epoch,
            frame,
            mode: self.mode,
            width: self.canvas.width(),
            height: self.canvas.height(),
        })
    }

    /// Complete a job started by [`begin_decode`](Self::begin_decode).
    pub fn finish_decode(
        &mut self,
        epoch: u64,
        result: Result<PaintedFrame, MirrorError>,
    ) -> RenderOutcome {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "decode result from old session ignored");
            return RenderOutcome::Stale;
        }
        self.decoding = false;

        match result {
            Ok(painted) => {
                let size = (painted.canvas.width(), painted.canvas.height());
                if size != (self.canvas.width(), self.canvas.height()) {
                    debug!(?size, "canvas resized during decode; frame discarded");
                    return RenderOutcome::Stale;
                }
                self.canvas = painted.canvas;
                self.last_placement = Some(painted.placement);
                self.painted += 1;
                self.meter.record();
                RenderOutcome::Painted(self.adapter.on_frame_rendered(&self.detector.stats()))
            }
            Err(e) => {
                warn!("failed to decode frame: {e}");
                self.detector.record_undecodable();
                RenderOutcome::Dropped
            }
        }
    }

    /// One animation tick with the decode run inline.
    ///
    /// Returns `None` when nothing was rendered.
    pub fn tick(&mut self) -> Option<RenderOutcome> {
        let job = self.begin_decode()?;
        let result = job.run();
        Some(self.finish_decode(job.epoch, result))
    }

    // ── Controls ─────────────────────────────────────────────────

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    /// Manual quality selection. Takes precedence over producer seeding.
    pub fn set_quality(&mut self, quality: Quality) {
        self.adapter.set_manual(quality);
        self.seeded = true;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.canvas.resize(width, height);
        self.last_placement = None;
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn session(&self) -> Option<ContextId> {
        self.session
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_decoding(&self) -> bool {
        self.decoding
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn quality(&self) -> Quality {
        self.adapter.quality()
    }

    pub fn drop_stats(&self) -> DropStats {
        self.detector.stats()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.detector.last_sequence()
    }

    pub fn fps(&mut self) -> f64 {
        self.meter.fps()
    }

    /// Frames painted this session.
    pub fn painted(&self) -> u64 {
        self.painted
    }

    pub fn last_placement(&self) -> Option<Placement> {
        self.last_placement
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }
}

impl Default for DisplayRenderer {
    fn default() -> Self {
        Self::new(RendererConfig::default())
    }
}

// ── Tests ────────────────────────────────────────────────────────
