//! Typed configuration, state and event messages for framecap.
//!
//! This crate defines the types shared between the capture session,
//! its encoders and whoever observes them.

mod events;
mod state;
mod types;

pub use events::{EncoderEvent, EventKind, SessionEvent};
pub use state::{RecorderState, SessionState, StopReason};
pub use types::{CaptureConfig, CaptureFormat, FormatParseError, SessionStats};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for session events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded session event channel.
pub fn event_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
