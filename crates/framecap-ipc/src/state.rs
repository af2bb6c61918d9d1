//! Session and recorder state machine types.

use serde::{Deserialize, Serialize};

/// The current state of a capture session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Constructed, not yet started.
    #[default]
    Idle,

    /// Accepting frames.
    Recording,

    /// Waiting for the encoder to flush.
    Stopping,

    /// Stopped; frames are ignored and the output can be saved.
    Stopped,

    /// Torn down; every public operation fails.
    Disposed,
}

impl SessionState {
    /// Returns true if the session is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the session is accepting frames.
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Returns true if the session is stopping or stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopping | Self::Stopped)
    }

    /// Returns true if the session has been disposed.
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Recording => "Recording",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Disposed => "Disposed",
        }
    }
}

/// Lifecycle of a native media recorder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderState {
    /// The platform has no recording capability. Terminal.
    Unsupported,

    /// Ready to record.
    #[default]
    Idle,

    /// Recording continuously.
    Recording,

    /// Final flush requested, waiting for the platform.
    Stopping,

    /// The platform confirmed the recorder stopped.
    Stopped,
}

impl RecorderState {
    /// Returns true if the recorder is recording or flushing.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Recording | Self::Stopping)
    }

    /// Returns the display name for this state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// Reason a session stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    /// Caller requested stop.
    UserRequested,

    /// The configured frame limit was reached.
    FrameLimit { frames: u64 },

    /// The configured time limit was reached.
    TimeLimit { seconds: f64 },

    /// The session was disposed while recording.
    Disposed,
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Capture stopped by caller".to_string(),
            Self::FrameLimit { frames } => format!("Frame limit reached after {frames} frames"),
            Self::TimeLimit { seconds } => format!("Time limit reached after {seconds:.2}s"),
            Self::Disposed => "Session disposed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_state_activity() {
        assert!(!RecorderState::default().is_active());
        assert!(RecorderState::Recording.is_active());
        assert!(RecorderState::Stopping.is_active());
        assert!(!RecorderState::Stopped.is_active());
        assert!(!RecorderState::Unsupported.is_active());
        assert_eq!(RecorderState::Stopping.name(), "stopping");
    }

    #[test]
    fn test_session_state_predicates() {
        assert!(SessionState::default().is_idle());
        assert!(SessionState::Stopping.is_stopped());
        assert!(SessionState::Stopped.is_stopped());
        assert!(!SessionState::Recording.is_stopped());
        assert!(SessionState::Disposed.is_disposed());
    }

    #[test]
    fn test_stop_reason_messages() {
        assert_eq!(
            StopReason::TimeLimit { seconds: 1.5 }.message(),
            "Time limit reached after 1.50s"
        );
        assert_eq!(
            StopReason::FrameLimit { frames: 3 }.message(),
            "Frame limit reached after 3 frames"
        );
    }
}
