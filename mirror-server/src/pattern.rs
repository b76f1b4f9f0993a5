//! Synthetic capture host for running the server without a browser.
//!
//! Paints a moving colour gradient so receivers have something to show.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use mirror_core::capture::{CaptureHost, CaptureStream, TrackSettings};
use mirror_core::error::MirrorError;

pub struct PatternHost {
    width: u32,
    height: u32,
}

impl PatternHost {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

#[async_trait]
impl CaptureHost for PatternHost {
    async fn request_display_media(&self) -> Result<Arc<dyn CaptureStream>, MirrorError> {
        Ok(Arc::new(PatternStream {
            width: self.width,
            height: self.height,
            phase: AtomicU32::new(0),
            stopped: AtomicBool::new(false),
        }))
    }

    async fn capture_viewport(&self) -> Result<RgbImage, MirrorError> {
        Ok(gradient(self.width, self.height, 0))
    }
}

struct PatternStream {
    width: u32,
    height: u32,
    phase: AtomicU32,
    stopped: AtomicBool,
}

#[async_trait]
impl CaptureStream for PatternStream {
    fn video_track(&self) -> Option<TrackSettings> {
        Some(TrackSettings {
            width: self.width,
            height: self.height,
        })
    }

    async fn grab(&self) -> Result<RgbImage, MirrorError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(MirrorError::StreamEnded);
        }
        let phase = self.phase.fetch_add(4, Ordering::Relaxed);
        Ok(gradient(self.width, self.height, phase))
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn gradient(width: u32, height: u32, phase: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let r = ((x * 255 / width) + phase) % 256;
        let g = (y * 255 / height) % 256;
        Rgb([r as u8, g as u8, (phase % 256) as u8])
    })
}
