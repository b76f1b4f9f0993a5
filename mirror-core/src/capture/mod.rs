//! Producer side: stream acquisition, encoding and the capture loop.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`stream`] | host capture traits, viewport fallback stream |
//! | [`encoder`] | fixed-size pixel buffer, JPEG encode |
//! | [`source`] | start/stop, fallback, the capture loop |
//! | [`agent`] | the capture context's message loop |

pub mod agent;
pub mod encoder;
pub mod source;
pub mod stream;

pub use agent::CaptureAgent;
pub use encoder::{PixelBuffer, encode_jpeg};
pub use source::{CaptureConfig, CaptureSource};
pub use stream::{CaptureHost, CaptureStrategy, CaptureStream, TrackSettings, ViewportStream};
