//! Off-screen canvas frames are painted onto.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::display::layout::{DisplayMode, Placement, place};

/// Letterbox fill.
pub const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// RGBA surface with a solid background.
pub struct Canvas {
    pixels: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Resize the surface. Contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.pixels = RgbaImage::from_pixel(width.max(1), height.max(1), BACKGROUND);
    }

    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = BACKGROUND;
        }
    }

    /// Paint `image` using `mode`, replacing the previous contents.
    pub fn paint(&mut self, image: &DynamicImage, mode: DisplayMode) -> Placement {
        let placement = place(mode, self.width(), self.height(), image.width(), image.height());
        self.clear();

        let w = placement.width.round() as u32;
        let h = placement.height.round() as u32;
        if w == 0 || h == 0 {
            return placement;
        }

        let scaled = imageops::resize(&image.to_rgba8(), w, h, FilterType::Triangle);
        imageops::overlay(
            &mut self.pixels,
            &scaled,
            placement.x.round() as i64,
            placement.y.round() as i64,
        );
        placement
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn red(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, image::Rgb([255, 0, 0])))
    }

    #[test]
    fn fit_leaves_letterbox_background() {
        let mut canvas = Canvas::new(80, 60);
        let p = canvas.paint(&red(160, 90), DisplayMode::Fit);
        assert_eq!(p.y, 7.5);

        assert_eq!(*canvas.pixels().get_pixel(40, 0), BACKGROUND);
        assert_eq!(*canvas.pixels().get_pixel(40, 59), BACKGROUND);
        assert!(canvas.pixels().get_pixel(40, 30).0[0] >= 250);
    }

    #[test]
    fn fill_covers_whole_canvas() {
        let mut canvas = Canvas::new(80, 60);
        canvas.paint(&red(160, 90), DisplayMode::Fill);
        assert!(canvas.pixels().pixels().all(|p| p.0[0] >= 250));
    }

    #[test]
    fn resize_clears() {
        let mut canvas = Canvas::new(10, 10);
        canvas.paint(&red(10, 10), DisplayMode::Fill);
        canvas.resize(20, 5);
        assert_eq!((canvas.width(), canvas.height()), (20, 5));
        assert!(canvas.pixels().pixels().all(|p| *p == BACKGROUND));
    }
}
