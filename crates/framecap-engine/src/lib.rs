//! Capture session controller for framecap.
//!
//! This crate ties a frame source's captures to one encoder: it tracks the
//! session state, advances the logical clock, applies motion blur, enforces
//! time and frame limits and routes encoder events to observers.

mod display;
mod error;
mod metrics;
mod session;
mod state;
mod time;

pub use display::StatusDisplay;
pub use error::SessionError;
pub use metrics::StatsCollector;
pub use session::{CaptureSession, ProgressCallback, SessionBuilder};
pub use state::StateTracker;
pub use time::{ManualTime, TimeSource, WallClock};

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
