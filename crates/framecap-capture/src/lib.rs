//! Canvas-like frames and the logical clock they are sampled on.
//!
//! This crate provides the frame type handed to encoders, sources that
//! produce frames, motion blur accumulation and a deterministic clock
//! that advances one frame duration per capture.

mod blur;
mod clock;
mod error;
mod frame;
mod source;

pub use blur::MotionBlur;
pub use clock::{LogicalClock, TimerId};
pub use error::CaptureError;
pub use frame::{CaptureTimestamp, Frame};
pub use source::PatternSource;

/// Result type for capture operations.
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for anything that can be sampled into frames.
pub trait FrameSource: Send {
    /// Produce the frame for the given logical time.
    fn next_frame(&mut self, time_ms: f64) -> CaptureResult<Frame>;

    /// Get the source dimensions.
    fn dimensions(&self) -> (u32, u32);
}
