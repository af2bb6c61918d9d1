//! Error types for the capture module.

use thiserror::Error;

/// Errors that can occur while building or sampling frames.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Pixel buffer does not match the declared dimensions.
    #[error("Invalid frame buffer: expected {expected} bytes for {width}x{height} RGBA, got {actual}")]
    InvalidBuffer {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// Frame has a zero dimension.
    #[error("Frame dimensions must be non-zero, got {width}x{height}")]
    EmptyFrame { width: u32, height: u32 },

    /// Frames blended together must share dimensions.
    #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// Frame source has no more frames.
    #[error("Frame source exhausted")]
    SourceExhausted,
}
