//! # mirror-server: mirror host and HTTP receiver
//!
//! Runs the mirror broker, capture agents and a local HTTP receiver in one
//! process. External displays load the receiver page and poll
//! `GET /api/frame` for the latest JPEG frame of the current session.
//!
//! ## Modules
//!
//! - **config**: TOML configuration with defaults for every section
//! - **bridge**: receiver slots exposed to the controller as mirror windows
//! - **routes**: the axum router (info, status, frame, static files)
//! - **host**: wiring of bus, controller, agents and server lifecycle
//! - **pattern**: synthetic capture host for running without a browser

pub mod bridge;
pub mod config;
pub mod host;
pub mod pattern;
pub mod routes;
