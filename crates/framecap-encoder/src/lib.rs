//! Encoder contract and format adapters.
//!
//! Every output format implements the same [`Encoder`] contract
//! (start, add, stop, save, dispose and event subscription) on top of an
//! injected backend: an archive writer and image converter for PNG/JPEG
//! sequences, a platform recorder or a software muxer for WebM, and a
//! worker-pool GIF renderer.

mod archive;
mod backends;
mod error;
mod events;
mod gif_encoder;
mod image_sequence;
mod native;
mod sink;
mod webm;

pub use archive::{ArchiveEncoder, ArchiveFactory, ArchiveWriter, TarArchive};
pub use backends::Backends;
pub use error::EncoderError;
pub use events::{EventBus, EventHandler};
pub use gif_encoder::{
    GifBackend, GifBackendFactory, GifEncoder, GifOptions, RenderCallbacks, WorkerPoolGif,
};
pub use image_sequence::{FrameConverter, ImageConverter, ImageKind, ImageSequenceEncoder};
pub use native::{
    NativeRecorder, NativeRecorderEncoder, RecorderPlatform, RecorderRequest, RecorderSignal,
    PREFERRED_MIME_TYPES,
};
pub use sink::{ArtifactSink, CollectingSink, NullSink};
pub use webm::{MuxerFactory, MuxerOptions, WebmEncoder, WebmMuxer};

use bytes::Bytes;
use tracing::info;

use framecap_capture::Frame;
use framecap_ipc::{CaptureConfig, CaptureFormat, EncoderEvent, EventKind};

/// Result type for encoder operations.
pub type EncoderResult<T> = Result<T, EncoderError>;

/// Callback receiving the artifact of a `save` call.
pub type SaveCallback = Box<dyn FnOnce(Artifact) + Send>;

/// Settings every encoder is constructed with.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Output format.
    pub format: CaptureFormat,

    /// Logical frames per second.
    pub rate: u32,

    /// Output quality (0 - 100).
    pub quality: u8,

    /// Worker threads for worker-pool backends.
    pub workers: usize,

    /// Location of worker scripts, passed through to backends.
    pub workers_path: String,

    /// Archive auto-save interval in captured seconds (0 = disabled).
    pub auto_save_time: f64,

    /// Base name of produced artifacts.
    pub name: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::from(&CaptureConfig::default())
    }
}

impl From<&CaptureConfig> for EncoderSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            format: config.format,
            rate: config.rate.max(1),
            quality: config.quality.min(100),
            workers: config.workers.max(1),
            workers_path: config.workers_path.clone(),
            auto_save_time: config.auto_save_time,
            name: config.name.clone(),
        }
    }
}

impl EncoderSettings {
    /// Settings for `format` with default values otherwise.
    pub fn for_format(format: CaptureFormat) -> Self {
        Self::from(&CaptureConfig::new(format))
    }
}

/// The binary result of one save.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Encoded bytes.
    pub data: Bytes,

    /// Format the bytes are encoded in.
    pub format: CaptureFormat,

    /// Base name without extension.
    pub base_name: String,

    /// Part number for auto-saved archive parts.
    pub part: Option<u32>,
}

impl Artifact {
    /// Create an artifact that is not part of a rotation.
    pub fn new(data: Bytes, format: CaptureFormat, base_name: impl Into<String>) -> Self {
        Self {
            data,
            format,
            base_name: base_name.into(),
            part: None,
        }
    }

    /// Tag this artifact with an auto-save part number.
    pub fn with_part(mut self, part: u32) -> Self {
        self.part = Some(part);
        self
    }

    /// File name including part suffix and extension.
    pub fn file_name(&self) -> String {
        let extension = self.format.artifact_extension();
        match self.part {
            Some(part) => format!("{}-part-{:02}.{}", self.base_name, part, extension),
            None => format!("{}.{}", self.base_name, extension),
        }
    }

    /// MIME type of the encoded bytes.
    pub fn mime_type(&self) -> &'static str {
        self.format.artifact_mime()
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the artifact holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The contract shared by every format adapter.
///
/// Operations never fail directly: backend failures are published as
/// [`EncoderEvent::Error`] on the encoder's bus. The default method bodies
/// are the no-op base behaviour.
pub trait Encoder: Send {
    /// Allocate backend resources and begin accepting frames.
    fn start(&mut self) {
        self.events().emit(EncoderEvent::Start);
    }

    /// Accept one frame.
    fn add(&mut self, frame: &Frame);

    /// Finish recording. Returns once backend buffers are flushed.
    fn stop(&mut self) {
        self.events().emit(EncoderEvent::Stop);
    }

    /// Deliver the final artifact to `callback`, now or once it is ready.
    fn save(&mut self, callback: SaveCallback) {
        drop(callback);
    }

    /// Release subscriptions and backend resources.
    fn dispose(&mut self) {
        self.events().dispose();
    }

    /// The encoder's event bus.
    fn events(&self) -> &EventBus;

    /// Frames accepted by the backend so far.
    fn frames(&self) -> u64;

    /// Encoder name for diagnostics.
    fn name(&self) -> &'static str;

    /// Subscribe to events of `kind`.
    fn on(&self, kind: EventKind, handler: EventHandler) {
        self.events().on(kind, move |event| handler(event));
    }

    /// Signal that one frame was processed.
    fn step(&self) {
        self.events().step();
    }
}

/// Create the encoder for `settings.format`.
///
/// Fails when the format's library is missing from `backends`
/// (software WebM muxer or GIF renderer). A missing platform recorder is
/// not fatal here; the native adapter reports it when started.
pub fn create_encoder(
    settings: EncoderSettings,
    backends: &Backends,
) -> EncoderResult<Box<dyn Encoder>> {
    let format = settings.format;
    let encoder: Box<dyn Encoder> = match format {
        CaptureFormat::Png | CaptureFormat::Jpeg => Box::new(ImageSequenceEncoder::new(
            settings,
            backends.archive.clone(),
            backends.converter.clone(),
            backends.sink.clone(),
        )),
        CaptureFormat::WebmSoftware => {
            Box::new(WebmEncoder::new(settings, backends.muxer.clone())?)
        }
        CaptureFormat::WebmNative => Box::new(NativeRecorderEncoder::new(
            settings,
            backends.recorder.clone(),
        )),
        CaptureFormat::Gif => Box::new(GifEncoder::new(settings, backends.gif.clone())?),
    };

    info!(%format, encoder = encoder.name(), "Created encoder");
    Ok(encoder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_names() {
        let artifact = Artifact::new(Bytes::from_static(b"x"), CaptureFormat::Png, "run");
        assert_eq!(artifact.file_name(), "run.tar");
        assert_eq!(artifact.clone().with_part(3).file_name(), "run-part-03.tar");
        assert_eq!(artifact.mime_type(), "application/x-tar");
    }

    #[test]
    fn test_settings_from_config() {
        let config = CaptureConfig {
            rate: 0,
            quality: 200,
            workers: 0,
            ..CaptureConfig::new(CaptureFormat::Gif)
        };
        let settings = EncoderSettings::from(&config);
        assert_eq!(settings.rate, 1);
        assert_eq!(settings.quality, 100);
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.format, CaptureFormat::Gif);
    }

    #[test]
    fn test_create_encoder_requires_libraries() {
        let backends = Backends::default();
        let webm = create_encoder(
            EncoderSettings::for_format(CaptureFormat::WebmSoftware),
            &backends,
        );
        assert!(matches!(webm, Err(EncoderError::LibraryUnavailable(_))));

        let gif = create_encoder(
            EncoderSettings::for_format(CaptureFormat::Gif),
            &backends.clone().without_gif(),
        );
        assert!(matches!(gif, Err(EncoderError::LibraryUnavailable(_))));

        let native = create_encoder(
            EncoderSettings::for_format(CaptureFormat::WebmNative),
            &backends,
        );
        assert!(native.is_ok());
    }

    #[test]
    fn test_create_encoder_selects_variant() {
        let backends = Backends::default();
        for (format, name) in [
            (CaptureFormat::Png, "png-sequence"),
            (CaptureFormat::Jpeg, "jpeg-sequence"),
            (CaptureFormat::Gif, "gif"),
            (CaptureFormat::WebmNative, "webm-native"),
        ] {
            let encoder = create_encoder(EncoderSettings::for_format(format), &backends).unwrap();
            assert_eq!(encoder.name(), name);
        }
    }
}
