//! # mirror-core
//!
//! Frame relay library for mirroring a web page into a separate window.
//!
//! A capture source in the page's context encodes still JPEG frames and
//! posts them over a message bus to the broker, which keeps only the
//! latest frame and pushes it to the bound display target. The display
//! side estimates dropped frames from sequence gaps, lowers encode
//! quality when too many go missing and paints frames with fit or fill
//! layout.
//!
//! This crate contains:
//! - **Messages**: `Message`, the closed set of actions exchanged between
//!   contexts, and `ContextId`
//! - **Frames**: `Frame`, `FrameEnvelope` (base64 payload on the wire)
//! - **Bus**: `MessageBus` seam and the in-process `LocalBus`
//! - **Relay**: `RelayBuffer`, `RelaySession`, `Broker`
//! - **Capture**: `CaptureSource`, `CaptureAgent` and the host traits
//! - **Display**: `DropDetector`, `DisplayRenderer`, `MirrorView`
//! - **Quality**: `Quality`, `QualityAdapter`
//! - **Controller**: `MirrorController`, the broker context's loop
//! - **Error**: `MirrorError`, a `thiserror`-based error hierarchy

pub mod bus;
pub mod capture;
pub mod controller;
pub mod display;
pub mod error;
pub mod frame;
pub mod message;
pub mod quality;
pub mod relay;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bus::{Envelope, LocalBus, Mailbox, MessageBus};
pub use capture::{
    CaptureAgent, CaptureConfig, CaptureHost, CaptureSource, CaptureStrategy, CaptureStream,
    TrackSettings,
};
pub use controller::{
    ControllerConfig, MirrorController, WindowHandle, WindowManager, WindowOptions,
};
pub use display::{
    Control, DisplayMode, DisplayRenderer, DropDetector, DropHealth, DropStats, MirrorStatus,
    MirrorView, ViewConfig, ViewHandle, ViewSnapshot,
};
pub use error::MirrorError;
pub use frame::{Frame, FrameEnvelope};
pub use message::{ContextId, Message, StreamStats};
pub use quality::{Quality, QualityAdapter};
pub use relay::{Broker, RelayBuffer, RelaySession, SubmitOutcome};
