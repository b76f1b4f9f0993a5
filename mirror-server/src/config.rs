//! Configuration for the mirror server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use mirror_core::capture::CaptureConfig;
use mirror_core::controller::ControllerConfig;
use mirror_core::quality::Quality;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// What the HTTP receiver reports and serves.
    pub receiver: ReceiverConfig,
    /// Capture settings handed to attached sources.
    pub capture: CaptureSettings,
    /// Mirror window settings.
    pub mirror: MirrorSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the HTTP receiver on.
    pub bind: String,
    pub port: u16,
}

/// HTTP receiver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Name reported by `/api/info`.
    pub name: String,
    pub version: String,
    /// Directory static files are served from.
    pub static_dir: String,
    /// Page served for `/` and `/index.html`, relative to `static_dir`.
    pub index: String,
}

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Requested frames per second for a screen share.
    pub frame_rate: u32,
    /// Frames per second when falling back to viewport screenshots.
    pub fallback_frame_rate: u32,
    /// Initial JPEG quality in percent (50..=95).
    pub quality: u8,
}

/// Mirror window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    pub width: u32,
    pub height: u32,
    /// Page loaded into a new mirror window.
    pub url: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8765,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            name: "Webpage Mirror".into(),
            version: "2.0.0".into(),
            static_dir: "static".into(),
            index: "mirror-server.html".into(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            fallback_frame_rate: 20,
            quality: 90,
        }
    }
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            url: "mirror.html".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Controller settings for the broker context.
    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            mirror_url: self.mirror.url.clone(),
            window_width: self.mirror.width.max(1),
            window_height: self.mirror.height.max(1),
            frame_rate: self.capture.frame_rate.clamp(1, 60),
        }
    }

    /// Capture settings for attached sources.
    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            frame_rate: self.capture.frame_rate.clamp(1, 60),
            fallback_frame_rate: self.capture.fallback_frame_rate.clamp(1, 60),
            initial_quality: Quality::new(self.capture.quality),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
