//! Injected collaborators the encoder factory draws from.

use std::sync::Arc;

use crate::archive::{ArchiveFactory, TarArchive};
use crate::gif_encoder::{GifBackendFactory, WorkerPoolGif};
use crate::image_sequence::{FrameConverter, ImageConverter};
use crate::native::RecorderPlatform;
use crate::sink::{ArtifactSink, NullSink};
use crate::webm::MuxerFactory;

/// Backends available to [`create_encoder`](crate::create_encoder).
///
/// The default set has a tar archive, the `image` converter and the
/// worker-pool GIF renderer. No software WebM muxer and no platform
/// recorder are bundled; hosts that have one register it here.
#[derive(Clone)]
pub struct Backends {
    pub(crate) archive: ArchiveFactory,
    pub(crate) converter: Arc<dyn FrameConverter>,
    pub(crate) recorder: Option<Arc<dyn RecorderPlatform>>,
    pub(crate) muxer: Option<MuxerFactory>,
    pub(crate) gif: Option<GifBackendFactory>,
    pub(crate) sink: Arc<dyn ArtifactSink>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            archive: TarArchive::factory(),
            converter: Arc::new(ImageConverter),
            recorder: None,
            muxer: None,
            gif: Some(WorkerPoolGif::factory()),
            sink: Arc::new(NullSink),
        }
    }
}

impl Backends {
    /// Set the sink receiving auto-saved artifacts.
    pub fn with_sink(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Register a platform media recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn RecorderPlatform>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Register a software WebM muxer.
    pub fn with_muxer(mut self, muxer: MuxerFactory) -> Self {
        self.muxer = Some(muxer);
        self
    }

    /// Replace the GIF renderer.
    pub fn with_gif(mut self, gif: GifBackendFactory) -> Self {
        self.gif = Some(gif);
        self
    }

    /// Remove the GIF renderer.
    pub fn without_gif(mut self) -> Self {
        self.gif = None;
        self
    }

    /// Replace the frame-to-image converter.
    pub fn with_converter(mut self, converter: Arc<dyn FrameConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// The sink receiving auto-saved artifacts.
    pub fn sink(&self) -> Arc<dyn ArtifactSink> {
        Arc::clone(&self.sink)
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("recorder", &self.recorder.is_some())
            .field("muxer", &self.muxer.is_some())
            .field("gif", &self.gif.is_some())
            .finish_non_exhaustive()
    }
}
