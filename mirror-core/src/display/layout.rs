//! Fit / fill placement of a decoded image on the canvas.

use serde::{Deserialize, Serialize};

/// How a frame is laid out on the canvas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Uniform scale, centred, letterboxed. Preserves aspect ratio.
    #[default]
    Fit,
    /// Stretch to the exact canvas size.
    Fill,
}

/// Destination rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    /// Whether the placement leaves canvas area uncovered.
    pub fn letterboxed(&self, canvas_width: u32, canvas_height: u32) -> bool {
        self.x > 0.0
            || self.y > 0.0
            || self.width < canvas_width as f64
            || self.height < canvas_height as f64
    }
}

/// Where an `image_width`×`image_height` image lands on the canvas.
///
/// Zero-sized images produce an empty placement.
pub fn place(
    mode: DisplayMode,
    canvas_width: u32,
    canvas_height: u32,
    image_width: u32,
    image_height: u32,
) -> Placement {
    let (cw, ch) = (canvas_width as f64, canvas_height as f64);
    if image_width == 0 || image_height == 0 {
        return Placement { x: 0.0, y: 0.0, width: 0.0, height: 0.0 };
    }

    match mode {
        DisplayMode::Fill => Placement { x: 0.0, y: 0.0, width: cw, height: ch },
        DisplayMode::Fit => {
            let (iw, ih) = (image_width as f64, image_height as f64);
            let scale = (cw / iw).min(ch / ih);
            let width = iw * scale;
            let height = ih * scale;
            Placement {
                x: (cw - width) / 2.0,
                y: (ch - height) / 2.0,
                width,
                height,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_wide_image_letterboxes_vertically() {
        let p = place(DisplayMode::Fit, 800, 600, 1600, 900);
        assert_eq!(p, Placement { x: 0.0, y: 75.0, width: 800.0, height: 450.0 });
        assert!(p.letterboxed(800, 600));
    }

    #[test]
    fn fit_tall_image_pillarboxes() {
        let p = place(DisplayMode::Fit, 800, 600, 300, 600);
        assert_eq!(p, Placement { x: 250.0, y: 0.0, width: 300.0, height: 600.0 });
    }

    #[test]
    fn fit_upscales_small_images() {
        let p = place(DisplayMode::Fit, 800, 600, 400, 300);
        assert_eq!(p, Placement { x: 0.0, y: 0.0, width: 800.0, height: 600.0 });
        assert!(!p.letterboxed(800, 600));
    }

    #[test]
    fn fill_stretches() {
        let p = place(DisplayMode::Fill, 800, 600, 1600, 900);
        assert_eq!(p, Placement { x: 0.0, y: 0.0, width: 800.0, height: 600.0 });
    }

    #[test]
    fn empty_image() {
        let p = place(DisplayMode::Fit, 800, 600, 0, 10);
        assert_eq!(p.width, 0.0);
    }
}
