//! Events published by encoders and sessions.

use serde::{Deserialize, Serialize};

use crate::state::{SessionState, StopReason};

/// Events that an encoder publishes on its event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncoderEvent {
    /// The encoder started.
    Start,

    /// The encoder stopped.
    Stop,

    /// One frame was processed.
    Step,

    /// Fractional progress (0.0 - 1.0) of a long-running operation.
    Progress(f32),

    /// A backend failure surfaced without aborting the session.
    Error { message: String },

    /// The final artifact is ready.
    Finished { size: usize },

    /// Save completed without an artifact because every frame was already
    /// delivered elsewhere.
    NothingToSave { reason: String },
}

impl EncoderEvent {
    /// Create an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The kind this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Start => EventKind::Start,
            Self::Stop => EventKind::Stop,
            Self::Step => EventKind::Step,
            Self::Progress(_) => EventKind::Progress,
            Self::Error { .. } => EventKind::Error,
            Self::Finished { .. } => EventKind::Finished,
            Self::NothingToSave { .. } => EventKind::NothingToSave,
        }
    }
}

/// Subscription key for encoder events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Start,
    Stop,
    Step,
    Progress,
    Error,
    Finished,
    NothingToSave,
}

/// Events that a session publishes to its observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: SessionState,

        /// Current state.
        current: SessionState,
    },

    /// A frame was forwarded to the encoder.
    FrameCaptured {
        /// Frames captured since start.
        count: u64,
    },

    /// Progress reported by the encoder.
    Progress(f32),

    /// Error reported by the encoder.
    Error {
        /// Error message.
        message: String,
    },

    /// The session stopped.
    Stopped(StopReason),

    /// A save found nothing left to deliver.
    NothingToSave {
        /// Why no artifact was produced.
        reason: String,
    },

    /// An artifact was delivered.
    ArtifactDelivered {
        /// Artifact file name.
        name: String,

        /// Artifact size in bytes.
        size: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(EncoderEvent::Progress(0.5).kind(), EventKind::Progress);
        assert_eq!(EncoderEvent::error("boom").kind(), EventKind::Error);
        assert_eq!(EncoderEvent::Finished { size: 4 }.kind(), EventKind::Finished);
        assert_eq!(
            EncoderEvent::NothingToSave { reason: String::new() }.kind(),
            EventKind::NothingToSave
        );
    }
}
