//! Consumer side: drop detection, decode, layout and paint.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`drops`] | sequence-gap drop estimate and health bands |
//! | [`layout`] | fit / fill placement |
//! | [`canvas`] | RGBA surface frames are painted onto |
//! | [`decoder`] | JPEG decode |
//! | [`meter`] | painted frames per second |
//! | [`renderer`] | pending slot, decode/paint cycle, quality adapter |
//! | [`view`] | the mirror window's event loop |

pub mod canvas;
pub mod decoder;
pub mod drops;
pub mod layout;
pub mod meter;
pub mod renderer;
pub mod view;

pub use canvas::Canvas;
pub use decoder::decode_jpeg;
pub use drops::{DropDetector, DropHealth, DropStats};
pub use layout::{DisplayMode, Placement, place};
pub use meter::FrameRateMeter;
pub use renderer::{DecodeJob, DisplayRenderer, PaintedFrame, RenderOutcome, RendererConfig};
pub use view::{Control, MirrorStatus, MirrorView, ViewConfig, ViewHandle, ViewSnapshot, key_binding};
