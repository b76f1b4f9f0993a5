//! Capture collaborators.
//!
//! The host runtime owns the permission-gated capture primitive. It is
//! reached through two traits: [`CaptureHost`] hands out streams and
//! one-off viewport screenshots, and [`CaptureStream`] is a live stream
//! whose current contents can be grabbed on demand.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use image::RgbImage;
use tracing::debug;

use crate::error::MirrorError;

/// Dimensions reported by a stream's video track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSettings {
    pub width: u32,
    pub height: u32,
}

/// A live capture stream.
#[async_trait]
pub trait CaptureStream: Send + Sync {
    /// Settings of the first video track, `None` when the stream has none.
    fn video_track(&self) -> Option<TrackSettings>;

    /// Current visual contents.
    ///
    /// Returns [`MirrorError::StreamEnded`] once the stream is over, for
    /// whatever reason.
    async fn grab(&self) -> Result<RgbImage, MirrorError>;

    /// Release every track. Must be idempotent.
    fn stop(&self);
}

/// The host's capture capabilities for one source page.
#[async_trait]
pub trait CaptureHost: Send + Sync {
    /// Ask the user to share a screen, window or tab.
    ///
    /// Fails with [`MirrorError::PermissionDenied`] when the prompt is
    /// declined.
    async fn request_display_media(&self) -> Result<Arc<dyn CaptureStream>, MirrorError>;

    /// Screenshot of the source page's visible viewport.
    async fn capture_viewport(&self) -> Result<RgbImage, MirrorError>;
}

/// How frames are being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// User-granted screen / window share.
    DisplayShare,
    /// Periodic whole-viewport screenshots.
    ViewportScreenshot,
}

impl fmt::Display for CaptureStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStrategy::DisplayShare => f.write_str("display share"),
            CaptureStrategy::ViewportScreenshot => f.write_str("viewport screenshot"),
        }
    }
}

// ── ViewportStream ───────────────────────────────────────────────

/// Viewport screenshots presented as a [`CaptureStream`].
///
/// Track settings come from a first screenshot taken on open.
pub struct ViewportStream {
    host: Arc<dyn CaptureHost>,
    settings: TrackSettings,
    stopped: AtomicBool,
}

impl ViewportStream {
    pub async fn open(host: Arc<dyn CaptureHost>) -> Result<Self, MirrorError> {
        let first = host.capture_viewport().await?;
        if first.width() == 0 || first.height() == 0 {
            return Err(MirrorError::NoTrack);
        }
        let settings = TrackSettings {
            width: first.width(),
            height: first.height(),
        };
        debug!(width = settings.width, height = settings.height, "viewport stream opened");
        Ok(Self {
            host,
            settings,
            stopped: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl CaptureStream for ViewportStream {
    fn video_track(&self) -> Option<TrackSettings> {
        Some(self.settings)
    }

    async fn grab(&self) -> Result<RgbImage, MirrorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MirrorError::StreamEnded);
        }
        self.host.capture_viewport().await
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Screenshots;

    #[async_trait]
    impl CaptureHost for Screenshots {
        async fn request_display_media(&self) -> Result<Arc<dyn CaptureStream>, MirrorError> {
            Err(MirrorError::PermissionDenied)
        }

        async fn capture_viewport(&self) -> Result<RgbImage, MirrorError> {
            Ok(RgbImage::new(320, 200))
        }
    }

    #[tokio::test]
    async fn viewport_stream_reports_first_screenshot_size() {
        let stream = ViewportStream::open(Arc::new(Screenshots)).await.unwrap();
        assert_eq!(
            stream.video_track(),
            Some(TrackSettings { width: 320, height: 200 })
        );
        assert!(stream.grab().await.is_ok());
    }

    #[tokio::test]
    async fn stopped_viewport_stream_ends() {
        let stream = ViewportStream::open(Arc::new(Screenshots)).await.unwrap();
        stream.stop();
        stream.stop();
        assert!(matches!(stream.grab().await, Err(MirrorError::StreamEnded)));
    }
}
