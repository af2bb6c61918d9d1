//! Error types for the session controller.

use thiserror::Error;

use framecap_encoder::EncoderError;

/// Errors returned by [`CaptureSession`](crate::CaptureSession) operations.
///
/// Failures inside an encoder during capture are not returned here; they
/// are logged and published as error events.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The encoder for the configured format could not be created.
    #[error("Failed to create encoder: {0}")]
    Encoder(#[from] EncoderError),

    /// The session has no encoder.
    #[error("Session has no encoder")]
    NoEncoder,

    /// The session has been disposed.
    #[error("Session has been disposed")]
    Disposed,
}
