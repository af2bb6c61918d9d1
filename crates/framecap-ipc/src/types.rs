//! Common types shared by the session and its encoders.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Output format of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureFormat {
    /// Tar archive of PNG images.
    #[serde(rename = "png")]
    Png,

    /// Tar archive of JPEG images.
    #[serde(rename = "jpg", alias = "jpeg")]
    Jpeg,

    /// WebM built by a software muxer.
    #[serde(rename = "webm", alias = "webm-software")]
    WebmSoftware,

    /// WebM recorded by the platform's native media recorder.
    #[serde(rename = "webm-native")]
    WebmNative,

    /// Animated GIF.
    #[serde(rename = "gif")]
    Gif,
}

impl CaptureFormat {
    /// Configuration spelling of this format.
    pub fn name(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebmSoftware => "webm",
            Self::WebmNative => "webm-native",
            Self::Gif => "gif",
        }
    }

    /// File extension of the artifact produced for this format.
    pub fn artifact_extension(self) -> &'static str {
        match self {
            Self::Png | Self::Jpeg => "tar",
            Self::WebmSoftware | Self::WebmNative => "webm",
            Self::Gif => "gif",
        }
    }

    /// MIME type of the artifact produced for this format.
    pub fn artifact_mime(self) -> &'static str {
        match self {
            Self::Png | Self::Jpeg => "application/x-tar",
            Self::WebmSoftware | Self::WebmNative => "video/webm",
            Self::Gif => "image/gif",
        }
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unknown format name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Unknown capture format: {0}")]
pub struct FormatParseError(pub String);

impl FromStr for CaptureFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webm" | "webm-software" => Ok(Self::WebmSoftware),
            "webm-native" => Ok(Self::WebmNative),
            "gif" => Ok(Self::Gif),
            other => Err(FormatParseError(other.to_string())),
        }
    }
}

/// Configuration for a capture session.
///
/// Every field is optional when deserialising; missing fields take the
/// values from [`CaptureConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Logical frames per second.
    pub rate: u32,

    /// Log lifecycle and per-frame activity at info level.
    pub verbose: bool,

    /// Maintain a textual status display.
    pub display: bool,

    /// Sub-frames averaged into each output frame (0 or 1 disables blur).
    pub motion_blur_frames: u32,

    /// Output quality (0 - 100).
    pub quality: u8,

    /// Output format.
    pub format: CaptureFormat,

    /// Location of worker scripts, handed to worker-based backends.
    pub workers_path: String,

    /// Number of workers for worker-pool backends.
    pub workers: usize,

    /// Stop automatically after this many seconds (0 = unlimited).
    pub time_limit: f64,

    /// Stop automatically after this many frames (0 = unlimited).
    pub frame_limit: u64,

    /// Save and rotate archives every this many captured seconds (0 = disabled).
    pub auto_save_time: f64,

    /// Base name of delivered artifacts.
    pub name: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            rate: 60,
            verbose: false,
            display: false,
            motion_blur_frames: 0,
            quality: 100,
            format: CaptureFormat::WebmSoftware,
            workers_path: String::new(),
            workers: 4,
            time_limit: 0.0,
            frame_limit: 0,
            auto_save_time: 0.0,
            name: "capture".to_string(),
        }
    }
}

impl CaptureConfig {
    /// Create a configuration for the given format with default settings.
    pub fn new(format: CaptureFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Normalize out-of-range values, logging each correction.
    pub fn validate(mut self) -> Self {
        if self.rate == 0 {
            warn!("Capture rate of 0 is invalid, using 1");
            self.rate = 1;
        }
        if self.quality > 100 {
            warn!(quality = self.quality, "Quality above 100, clamping");
            self.quality = 100;
        }
        if self.workers == 0 {
            warn!("Worker count of 0 is invalid, using 1");
            self.workers = 1;
        }
        for (field, value) in [
            ("time_limit", &mut self.time_limit),
            ("auto_save_time", &mut self.auto_save_time),
        ] {
            if !value.is_finite() || *value < 0.0 {
                warn!(field, value = *value, "Negative or non-finite limit, disabling");
                *value = 0.0;
            }
        }
        if self.name.trim().is_empty() {
            self.name = "capture".to_string();
        }
        self
    }

    /// Duration of one frame in milliseconds.
    pub fn frame_duration_ms(&self) -> f64 {
        1000.0 / f64::from(self.rate.max(1))
    }

    /// Effective motion blur factor (1 when blur is disabled).
    pub fn blur_factor(&self) -> u32 {
        self.motion_blur_frames.max(1)
    }

    /// Returns true if a time limit is configured.
    pub fn has_time_limit(&self) -> bool {
        self.time_limit > 0.0
    }

    /// Returns true if a frame limit is configured.
    pub fn has_frame_limit(&self) -> bool {
        self.frame_limit > 0
    }

    /// Returns true if archive auto-save is configured.
    pub fn has_auto_save(&self) -> bool {
        self.auto_save_time > 0.0
    }
}

/// Snapshot of session counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frames forwarded to the encoder since start.
    pub frames_captured: u64,

    /// Sub-frames folded into motion-blurred frames.
    pub subframes_blended: u64,

    /// Error events reported by the encoder.
    pub errors_reported: u64,

    /// Artifacts delivered to a callback or sink.
    pub artifacts_delivered: u64,

    /// Wall-clock seconds since start.
    pub elapsed_seconds: f64,

    /// Logical time in milliseconds since start.
    pub logical_ms: f64,
}
