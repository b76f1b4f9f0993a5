//! The capture source.
//!
//! Acquires a stream (screen share first, viewport screenshots as the
//! fallback) and runs the capture loop: on each tick grab the stream's
//! contents, then draw them into a fixed-size buffer and encode at the
//! current quality on the blocking pool, and post the frame to the broker.
//!
//! The loop awaits each encode before it takes another tick, and missed
//! ticks are skipped, so a slow encoder sheds frames instead of queueing
//! them. Sequence numbers only advance on a successful encode.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::capture::encoder::PixelBuffer;
use crate::capture::stream::{CaptureHost, CaptureStrategy, CaptureStream, ViewportStream};
use crate::error::MirrorError;
use crate::frame::{Frame, FrameEnvelope};
use crate::message::{ContextId, Message};
use crate::quality::Quality;

// ── CaptureConfig ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Ticks per second for a screen share, unless the request names one.
    pub frame_rate: u32,
    /// Ticks per second for viewport screenshots.
    pub fallback_frame_rate: u32,
    pub initial_quality: Quality,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            fallback_frame_rate: 20,
            initial_quality: Quality::DEFAULT,
        }
    }
}

fn tick_period(frame_rate: u32) -> Duration {
    Duration::from_secs_f64(1.0 / frame_rate.clamp(1, 120) as f64)
}

// ── CaptureSource ────────────────────────────────────────────────

struct ActiveCapture {
    target: ContextId,
    strategy: CaptureStrategy,
    stream: Arc<dyn CaptureStream>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct CaptureSource {
    id: ContextId,
    broker: ContextId,
    bus: Arc<dyn MessageBus>,
    host: Arc<dyn CaptureHost>,
    config: CaptureConfig,
    quality: watch::Sender<Quality>,
    active: Option<ActiveCapture>,
}

impl CaptureSource {
    /// A source living at bus address `id` that posts frames to `broker`.
    pub fn new(
        id: ContextId,
        broker: ContextId,
        bus: Arc<dyn MessageBus>,
        host: Arc<dyn CaptureHost>,
        config: CaptureConfig,
    ) -> Self {
        let (quality, _) = watch::channel(config.initial_quality);
        Self {
            id,
            broker,
            bus,
            host,
            config,
            quality,
            active: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn broker(&self) -> ContextId {
        self.broker
    }

    /// Start capturing for `target`.
    ///
    /// `frame_rate` overrides the configured share rate. Starting for the
    /// target already being captured is a no-op; any other running capture
    /// is stopped first.
    pub async fn start(
        &mut self,
        target: ContextId,
        frame_rate: Option<u32>,
    ) -> Result<CaptureStrategy, MirrorError> {
        if let Some(active) = &self.active {
            if active.target == target && !active.token.is_cancelled() {
                debug!(%target, "already capturing");
                return Ok(active.strategy);
            }
        }
        self.stop();

        let (stream, strategy) = self.acquire().await?;
        let Some(settings) = stream.video_track() else {
            stream.stop();
            return Err(MirrorError::NoTrack);
        };
        let rate = match strategy {
            CaptureStrategy::DisplayShare => frame_rate.unwrap_or(self.config.frame_rate),
            CaptureStrategy::ViewportScreenshot => self.config.fallback_frame_rate,
        };
        info!(
            %target,
            %strategy,
            width = settings.width,
            height = settings.height,
            rate,
            "capture started"
        );

        let token = CancellationToken::new();
        let ctx = LoopContext {
            id: self.id,
            broker: self.broker,
            target,
            bus: Arc::clone(&self.bus),
            stream: Arc::clone(&stream),
            width: settings.width,
            height: settings.height,
            buffer: None,
            quality: self.quality.subscribe(),
            period: tick_period(rate),
            token: token.clone(),
        };
        let task = tokio::spawn(ctx.run());

        self.active = Some(ActiveCapture {
            target,
            strategy,
            stream,
            token,
            task,
        });
        Ok(strategy)
    }

    async fn acquire(&self) -> Result<(Arc<dyn CaptureStream>, CaptureStrategy), MirrorError> {
        match self.host.request_display_media().await {
            Ok(stream) if stream.video_track().is_some() => {
                return Ok((stream, CaptureStrategy::DisplayShare));
            }
            Ok(stream) => {
                stream.stop();
                warn!("shared stream has no video track; falling back to viewport capture");
            }
            Err(e) if e.triggers_fallback() => {
                warn!("screen share unavailable: {e}; falling back to viewport capture");
            }
            Err(e) => return Err(e),
        }

        let stream = ViewportStream::open(Arc::clone(&self.host)).await?;
        Ok((Arc::new(stream), CaptureStrategy::ViewportScreenshot))
    }

    /// Stop capturing: release the stream and clear the loop.
    ///
    /// Safe to call when already stopped. Returns whether anything was
    /// running.
    pub fn stop(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.token.cancel();
        active.stream.stop();
        active.task.abort();
        info!(target = %active.target, "capture stopped");
        true
    }

    /// Whether the loop is producing frames.
    pub fn is_capturing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.token.is_cancelled() && !a.task.is_finished())
    }

    pub fn has_stream(&self) -> bool {
        self.active.is_some()
    }

    pub fn strategy(&self) -> Option<CaptureStrategy> {
        self.active.as_ref().map(|a| a.strategy)
    }

    pub fn target(&self) -> Option<ContextId> {
        self.active.as_ref().map(|a| a.target)
    }

    /// Quality used from the next tick on.
    pub fn set_quality(&self, quality: Quality) {
        if self.quality.send_replace(quality) != quality {
            info!("capture quality set to {quality}");
        }
    }

    pub fn quality(&self) -> Quality {
        *self.quality.borrow()
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Capture loop ─────────────────────────────────────────────────

struct LoopContext {
    id: ContextId,
    broker: ContextId,
    target: ContextId,
    bus: Arc<dyn MessageBus>,
    stream: Arc<dyn CaptureStream>,
    width: u32,
    height: u32,
    /// Lent to the blocking pool while a frame is rendered.
    buffer: Option<PixelBuffer>,
    quality: watch::Receiver<Quality>,
    period: Duration,
    token: CancellationToken,
}

impl LoopContext {
    async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let mut sequence: u64 = 0;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let grabbed = tokio::select! {
                _ = self.token.cancelled() => break,
                grabbed = self.stream.grab() => grabbed,
            };
            let image = match grabbed {
                Ok(image) => image,
                Err(MirrorError::StreamEnded) => {
                    info!("capture stream ended");
                    self.stream.stop();
                    self.token.cancel();
                    self.bus.post(
                        self.id,
                        self.broker,
                        Message::CaptureStopped {
                            reason: MirrorError::StreamEnded.to_string(),
                        },
                    );
                    break;
                }
                Err(e) => {
                    warn!("capture failed: {e}");
                    continue;
                }
            };

            let quality = *self.quality.borrow_and_update();
            let mut buffer = self
                .buffer
                .take()
                .unwrap_or_else(|| PixelBuffer::new(self.width, self.height));
            let render = tokio::task::spawn_blocking(move || {
                let encoded = buffer.render(&image, quality);
                (buffer, encoded)
            });
            let encoded = tokio::select! {
                _ = self.token.cancelled() => break,
                joined = render => match joined {
                    Ok((buffer, encoded)) => {
                        self.buffer = Some(buffer);
                        encoded
                    }
                    Err(e) => Err(MirrorError::from(e)),
                },
            };

            match encoded {
                Ok(data) => {
                    let frame = Frame::new(sequence, started.elapsed().as_millis() as u64, data);
                    debug!(seq = sequence, bytes = frame.len(), %quality, "frame captured");
                    let envelope = FrameEnvelope::new(&frame, self.target).with_quality(quality);
                    self.bus
                        .post(self.id, self.broker, Message::FrameUpdate(envelope));
                    sequence += 1;
                }
                Err(e) => warn!("frame encode failed: {e}"),
            }
        }
        debug!(frames = sequence, "capture loop exited");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{LocalBus, Mailbox};
    use crate::display::decoder::decode_jpeg;
    use async_trait::async_trait;
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const SOURCE: ContextId = ContextId(1);
    const BROKER: ContextId = ContextId(100);
    const TARGET: ContextId = ContextId(2);

    struct FakeStream {
        track: bool,
        stopped: AtomicBool,
        stops: AtomicUsize,
        end_after: Option<usize>,
        grabs: AtomicUsize,
    }

    impl FakeStream {
        fn new(track: bool, end_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                track,
                stopped: AtomicBool::new(false),
                stops: AtomicUsize::new(0),
                end_after,
                grabs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CaptureStream for FakeStream {
        fn video_track(&self) -> Option<crate::capture::stream::TrackSettings> {
            self.track
                .then_some(crate::capture::stream::TrackSettings { width: 40, height: 30 })
        }

        async fn grab(&self) -> Result<RgbImage, MirrorError> {
            let n = self.grabs.fetch_add(1, Ordering::SeqCst);
            if self.stopped.load(Ordering::SeqCst) || self.end_after.is_some_and(|e| n >= e) {
                return Err(MirrorError::StreamEnded);
            }
            Ok(RgbImage::from_pixel(80, 60, image::Rgb([200, 100, 0])))
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    enum Share {
        Grant(Arc<FakeStream>),
        Deny,
    }

    struct FakeHost {
        share: Share,
    }

    #[async_trait]
    impl CaptureHost for FakeHost {
        async fn request_display_media(&self) -> Result<Arc<dyn CaptureStream>, MirrorError> {
            match &self.share {
                Share::Grant(s) => Ok(s.clone() as Arc<dyn CaptureStream>),
                Share::Deny => Err(MirrorError::PermissionDenied),
            }
        }

        async fn capture_viewport(&self) -> Result<RgbImage, MirrorError> {
            Ok(RgbImage::from_pixel(64, 48, image::Rgb([0, 0, 255])))
        }
    }

    fn source(share: Share) -> (CaptureSource, Mailbox) {
        let bus = Arc::new(LocalBus::new());
        let broker = bus.register(BROKER);
        let config = CaptureConfig {
            frame_rate: 100,
            fallback_frame_rate: 100,
            initial_quality: Quality::DEFAULT,
        };
        let src = CaptureSource::new(SOURCE, BROKER, bus, Arc::new(FakeHost { share }), config);
        (src, broker)
    }

    async fn next_frame(mailbox: &mut Mailbox) -> FrameEnvelope {
        loop {
            let env = tokio::time::timeout(Duration::from_secs(5), mailbox.recv())
                .await
                .expect("timed out")
                .expect("bus closed");
            if let Message::FrameUpdate(frame) = env.message {
                assert_eq!(env.from, SOURCE);
                return frame;
            }
        }
    }

    #[tokio::test]
    async fn share_produces_sequenced_frames() {
        let stream = FakeStream::new(true, None);
        let (mut src, mut broker) = source(Share::Grant(stream.clone()));

        let strategy = src.start(TARGET, None).await.unwrap();
        assert_eq!(strategy, CaptureStrategy::DisplayShare);

        for expected in 0..3 {
            let frame = next_frame(&mut broker).await;
            assert_eq!(frame.sequence_number, expected);
            assert_eq!(frame.target_id, TARGET);
            let img = decode_jpeg(&frame.frame).unwrap();
            assert_eq!((img.width(), img.height()), (40, 30));
        }
        src.stop();
    }

    #[tokio::test]
    async fn denied_share_falls_back_to_viewport() {
        let (mut src, mut broker) = source(Share::Deny);

        let strategy = src.start(TARGET, Some(30)).await.unwrap();
        assert_eq!(strategy, CaptureStrategy::ViewportScreenshot);

        let frame = next_frame(&mut broker).await;
        let img = decode_jpeg(&frame.frame).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[tokio::test]
    async fn trackless_share_falls_back() {
        let stream = FakeStream::new(false, None);
        let (mut src, _broker) = source(Share::Grant(stream.clone()));

        let strategy = src.start(TARGET, None).await.unwrap();
        assert_eq!(strategy, CaptureStrategy::ViewportScreenshot);
        assert_eq!(stream.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let stream = FakeStream::new(true, None);
        let (mut src, _broker) = source(Share::Grant(stream.clone()));
        src.start(TARGET, None).await.unwrap();

        assert!(src.stop());
        assert!(stream.stopped.load(Ordering::SeqCst));
        assert!(!src.has_stream());

        assert!(!src.stop());
        assert!(!src.has_stream());
        assert!(!src.is_capturing());
        assert_eq!(stream.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ended_stream_reports_upstream() {
        let stream = FakeStream::new(true, Some(2));
        let (mut src, mut broker) = source(Share::Grant(stream.clone()));
        src.start(TARGET, None).await.unwrap();

        let stopped = loop {
            let env = tokio::time::timeout(Duration::from_secs(5), broker.recv())
                .await
                .unwrap()
                .unwrap();
            if let Message::CaptureStopped { reason } = env.message {
                break reason;
            }
        };
        assert_eq!(stopped, "capture stream ended");
        assert!(stream.stopped.load(Ordering::SeqCst));
        assert!(!src.is_capturing());
        src.stop();
        assert!(!src.has_stream());
    }

    #[tokio::test]
    async fn quality_change_is_read_by_loop() {
        let stream = FakeStream::new(true, None);
        let (mut src, mut broker) = source(Share::Grant(stream));
        src.start(TARGET, None).await.unwrap();
        next_frame(&mut broker).await;

        src.set_quality(Quality::new(60));
        assert_eq!(src.quality(), Quality::new(60));
        next_frame(&mut broker).await;
        src.stop();
    }

    #[tokio::test]
    async fn restarting_same_target_keeps_stream() {
        let stream = FakeStream::new(true, None);
        let (mut src, _broker) = source(Share::Grant(stream.clone()));
        src.start(TARGET, None).await.unwrap();
        src.start(TARGET, None).await.unwrap();
        assert_eq!(stream.stops.load(Ordering::SeqCst), 0);
        assert_eq!(src.target(), Some(TARGET));
    }
}
