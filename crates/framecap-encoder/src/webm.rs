//! Software WebM encoder.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument};

use framecap_capture::Frame;
use framecap_ipc::EncoderEvent;

use crate::events::EventBus;
use crate::{Artifact, Encoder, EncoderError, EncoderResult, EncoderSettings, SaveCallback};

/// Options a muxer is created with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuxerOptions {
    /// Frames per second of the output.
    pub rate: u32,

    /// Quality as a fraction (0.0 - 1.0).
    pub quality: f32,
}

impl MuxerOptions {
    fn from_settings(settings: &EncoderSettings) -> Self {
        Self {
            rate: settings.rate,
            quality: f32::from(settings.quality) / 100.0,
        }
    }
}

/// A software WebM muxer buffering raw frames until compiled.
pub trait WebmMuxer: Send {
    /// Buffer one frame.
    fn add_frame(&mut self, frame: &Frame) -> EncoderResult<()>;

    /// Encode every buffered frame into a WebM container.
    fn compile(&mut self) -> EncoderResult<Bytes>;
}

/// Creates a fresh muxer per recording.
pub type MuxerFactory = Arc<dyn Fn(MuxerOptions) -> Box<dyn WebmMuxer> + Send + Sync>;

/// Encoder handing raw frames to a software muxer.
///
/// There is no stop primitive; compilation happens synchronously in
/// `save` and can take a while for long captures.
pub struct WebmEncoder {
    settings: EncoderSettings,
    factory: MuxerFactory,
    muxer: Option<Box<dyn WebmMuxer>>,
    frames: u64,
    bus: EventBus,
}

impl WebmEncoder {
    /// Create the encoder. Fails when no muxer library is available.
    pub fn new(settings: EncoderSettings, factory: Option<MuxerFactory>) -> EncoderResult<Self> {
        let factory = factory.ok_or_else(|| {
            EncoderError::LibraryUnavailable("no software WebM muxer registered".to_string())
        })?;

        Ok(Self {
            settings,
            factory,
            muxer: None,
            frames: 0,
            bus: EventBus::new(),
        })
    }
}

impl Encoder for WebmEncoder {
    #[instrument(name = "webm_start", skip(self), fields(rate = self.settings.rate))]
    fn start(&mut self) {
        let options = MuxerOptions::from_settings(&self.settings);
        self.muxer = Some((self.factory)(options));
        self.frames = 0;
        debug!(quality = options.quality, "WebM muxer created");
        self.bus.emit(EncoderEvent::Start);
    }

    fn add(&mut self, frame: &Frame) {
        let Some(muxer) = self.muxer.as_mut() else {
            self.bus.error(EncoderError::NotStarted.to_string());
            return;
        };

        if let Err(e) = muxer.add_frame(frame) {
            self.bus.error(e.to_string());
            return;
        }

        self.frames += 1;
        self.bus.step();
    }

    fn save(&mut self, callback: SaveCallback) {
        let Some(muxer) = self.muxer.as_mut() else {
            self.bus.error(EncoderError::NotStarted.to_string());
            return;
        };

        match muxer.compile() {
            Ok(data) => {
                info!(size = data.len(), frames = self.frames, "WebM compiled");
                let artifact = Artifact::new(data, self.settings.format, self.settings.name.clone());
                callback(artifact);
            }
            Err(e) => self.bus.error(e.to_string()),
        }
    }

    fn dispose(&mut self) {
        self.muxer = None;
        self.frames = 0;
        self.bus.dispose();
    }

    fn events(&self) -> &EventBus {
        &self.bus
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn name(&self) -> &'static str {
        "webm"
    }
}
