//! Pixel buffer and JPEG encoding for captured frames.

use bytes::Bytes;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};

use crate::error::MirrorError;
use crate::quality::Quality;

/// Fixed-size RGB buffer each capture tick is drawn into.
///
/// Sources whose size differs are scaled with nearest-neighbour sampling.
pub struct PixelBuffer {
    image: RgbImage,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Draw `src` over the whole buffer.
    pub fn draw(&mut self, src: &RgbImage) {
        let (dst_w, dst_h) = self.image.dimensions();
        let (src_w, src_h) = src.dimensions();
        if src_w == 0 || src_h == 0 {
            return;
        }
        if (src_w, src_h) == (dst_w, dst_h) {
            self.image.copy_from_slice(src.as_raw());
        } else {
            self.image = imageops::resize(src, dst_w, dst_h, FilterType::Nearest);
        }
    }

    /// Draw `src` and encode the result.
    ///
    /// CPU-bound; async callers run it on the blocking pool.
    pub fn render(&mut self, src: &RgbImage, quality: Quality) -> Result<Bytes, MirrorError> {
        self.draw(src);
        encode_jpeg(&self.image, quality)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// JPEG-encode `image` at `quality`.
pub fn encode_jpeg(image: &RgbImage, quality: Quality) -> Result<Bytes, MirrorError> {
    let mut buf = Vec::with_capacity(image.as_raw().len() / 8);
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.percent());
    image
        .write_with_encoder(encoder)
        .map_err(|e| MirrorError::EncodeFailure(e.to_string()))?;
    Ok(Bytes::from(buf))
}
