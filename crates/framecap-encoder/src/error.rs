//! Error types for the encoder module.

use thiserror::Error;

/// Errors that can occur during encoding operations.
///
/// Adapters turn these into `error` events once a session is running;
/// they are only returned directly while constructing an encoder.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The platform lacks a required capability.
    #[error("Backend not supported: {0}")]
    Unsupported(String),

    /// A required encoding library was not provided.
    #[error("Encoding library unavailable: {0}")]
    LibraryUnavailable(String),

    /// A frame could not be converted to an image.
    #[error("Frame conversion failed: {0}")]
    Conversion(String),

    /// Reading or writing a buffer failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Save was called before any archive existed.
    #[error("No archive to save; call start() first")]
    NoArchive,

    /// Nothing was captured to build an artifact from.
    #[error("No data captured: {0}")]
    NoData(String),

    /// The encoder has not been started.
    #[error("Encoder not started")]
    NotStarted,

    /// Invalid input data.
    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    /// Rendering or muxing the final output failed.
    #[error("Render failed: {0}")]
    Render(String),

    /// Work was abandoned because the encoder was disposed.
    #[error("Encoder disposed")]
    Disposed,
}
