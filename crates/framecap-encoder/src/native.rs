//! WebM encoder backed by the platform's media recorder.
//!
//! The platform recorder samples a live surface continuously instead of
//! taking discrete frames, so every captured frame is drawn onto that
//! surface and the recorder delivers time-sliced chunks through a channel.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, instrument, warn};

use framecap_capture::Frame;
use framecap_ipc::{EncoderEvent, RecorderState};

use crate::events::EventBus;
use crate::{Artifact, Encoder, EncoderError, EncoderResult, EncoderSettings, SaveCallback};

/// Container/codec strings tried in order during negotiation.
pub const PREFERRED_MIME_TYPES: [&str; 3] = [
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
];

/// Interval between data chunks requested from the recorder.
const TIMESLICE: Duration = Duration::from_millis(100);

/// How long `stop` waits for the recorder to confirm.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const SIGNAL_CHANNEL_CAPACITY: usize = 1024;

/// Message from a platform recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderSignal {
    /// A chunk of encoded data.
    Data(Bytes),

    /// The recorder has flushed its last chunk and stopped.
    Stopped,

    /// The recorder hit an error; recording may continue.
    Error(String),
}

/// Parameters for opening a recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderRequest {
    /// Negotiated MIME type.
    pub mime_type: String,

    /// Frame rate of the recorded surface.
    pub frame_rate: u32,

    /// Interval between data chunks.
    pub timeslice: Duration,
}

/// A platform media-recording facility.
pub trait RecorderPlatform: Send + Sync {
    /// Returns true if the platform can record at all.
    fn is_supported(&self) -> bool;

    /// Returns true if `mime_type` can be recorded.
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Create a surface and start recording it, sending chunks to `signals`.
    fn open(
        &self,
        request: RecorderRequest,
        signals: Sender<RecorderSignal>,
    ) -> EncoderResult<Box<dyn NativeRecorder>>;
}

/// A running recorder and the surface it samples.
pub trait NativeRecorder: Send {
    /// Resize the recorded surface.
    fn resize(&mut self, width: u32, height: u32);

    /// Draw `frame` onto the surface.
    fn draw(&mut self, frame: &Frame) -> EncoderResult<()>;

    /// Ask for a final flush. The recorder answers with [`RecorderSignal::Stopped`].
    fn request_stop(&mut self);

    /// Release the stream's media tracks.
    fn release_tracks(&mut self);
}

/// Encoder bridging discrete frames to a continuous platform recorder.
pub struct NativeRecorderEncoder {
    settings: EncoderSettings,
    platform: Option<Arc<dyn RecorderPlatform>>,
    recorder: Option<Box<dyn NativeRecorder>>,
    signals: Option<Receiver<RecorderSignal>>,
    chunks: Vec<Bytes>,
    state: RecorderState,
    mime_type: Option<String>,
    sized: bool,
    frames: u64,
    stop_timeout: Duration,
    bus: EventBus,
}

impl NativeRecorderEncoder {
    /// Create the encoder. A missing platform surfaces as an error on start.
    pub fn new(settings: EncoderSettings, platform: Option<Arc<dyn RecorderPlatform>>) -> Self {
        let state = match &platform {
            Some(platform) if platform.is_supported() => RecorderState::Idle,
            _ => RecorderState::Unsupported,
        };

        Self {
            settings,
            platform,
            recorder: None,
            signals: None,
            chunks: Vec::new(),
            state,
            mime_type: None,
            sized: false,
            frames: 0,
            stop_timeout: STOP_TIMEOUT,
            bus: EventBus::new(),
        }
    }

    /// Override how long `stop` waits for the recorder.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Current recorder state.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// MIME type chosen during negotiation.
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    /// Open a recorder, falling back through [`PREFERRED_MIME_TYPES`].
    fn negotiate(
        &self,
        platform: &dyn RecorderPlatform,
        signals: &Sender<RecorderSignal>,
    ) -> EncoderResult<(String, Box<dyn NativeRecorder>)> {
        let mut last_error = None;

        for mime_type in PREFERRED_MIME_TYPES {
            if !platform.is_type_supported(mime_type) {
                debug!(mime_type, "Codec not supported, trying next");
                continue;
            }

            let request = RecorderRequest {
                mime_type: mime_type.to_string(),
                frame_rate: self.settings.rate,
                timeslice: TIMESLICE,
            };
            match platform.open(request, signals.clone()) {
                Ok(recorder) => return Ok((mime_type.to_string(), recorder)),
                Err(e) => {
                    debug!(mime_type, "Recorder rejected codec: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            EncoderError::Unsupported("no WebM codec accepted by the platform".to_string())
        }))
    }

    /// Move pending chunks out of the channel.
    fn drain(&mut self) -> bool {
        let Some(signals) = &self.signals else {
            return false;
        };

        let mut stopped = false;
        for signal in signals.try_iter() {
            match signal {
                RecorderSignal::Data(chunk) if !chunk.is_empty() => self.chunks.push(chunk),
                RecorderSignal::Data(_) => {}
                RecorderSignal::Stopped => stopped = true,
                RecorderSignal::Error(message) => self.bus.error(message),
            }
        }
        stopped
    }

    fn wait_for_stop(&mut self) {
        let Some(signals) = self.signals.clone() else {
            return;
        };

        loop {
            match signals.recv_timeout(self.stop_timeout) {
                Ok(RecorderSignal::Data(chunk)) => {
                    if !chunk.is_empty() {
                        self.chunks.push(chunk);
                    }
                }
                Ok(RecorderSignal::Error(message)) => self.bus.error(message),
                Ok(RecorderSignal::Stopped) => break,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(timeout = ?self.stop_timeout, "Recorder did not confirm stop");
                    self.bus.error(format!(
                        "Recorder did not stop within {:?}",
                        self.stop_timeout
                    ));
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn release_tracks(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            recorder.release_tracks();
            debug!("Released recorder tracks");
        }
    }

    fn release(&mut self) {
        self.release_tracks();
        self.signals = None;
    }
}

impl Encoder for NativeRecorderEncoder {
    #[instrument(name = "native_start", skip(self), fields(state = self.state.name()))]
    fn start(&mut self) {
        let platform = match &self.platform {
            Some(platform) if self.state != RecorderState::Unsupported => Arc::clone(platform),
            _ => {
                self.bus.error(
                    EncoderError::Unsupported("platform media recorder unavailable".to_string())
                        .to_string(),
                );
                self.stop();
                return;
            }
        };

        self.release();
        self.chunks.clear();
        self.sized = false;
        self.frames = 0;

        let (tx, rx) = bounded(SIGNAL_CHANNEL_CAPACITY);
        match self.negotiate(platform.as_ref(), &tx) {
            Ok((mime_type, recorder)) => {
                info!(%mime_type, rate = self.settings.rate, "Native recorder started");
                self.mime_type = Some(mime_type);
                self.recorder = Some(recorder);
                self.signals = Some(rx);
                self.state = RecorderState::Recording;
                self.bus.emit(EncoderEvent::Start);
            }
            Err(e) => {
                self.bus.error(e.to_string());
                self.state = RecorderState::Stopped;
                self.bus.emit(EncoderEvent::Stop);
            }
        }
    }

    fn add(&mut self, frame: &Frame) {
        if self.state != RecorderState::Recording {
            return;
        }
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };

        if !self.sized {
            recorder.resize(frame.width, frame.height);
            self.sized = true;
            debug!(width = frame.width, height = frame.height, "Sized recording surface");
        }

        if let Err(e) = recorder.draw(frame) {
            self.bus.error(e.to_string());
        } else {
            self.frames += 1;
        }

        if self.drain() {
            warn!("Recorder stopped on its own");
            self.state = RecorderState::Stopped;
            self.release_tracks();
        }
        self.bus.step();
    }

    #[instrument(name = "native_stop", skip(self), fields(state = self.state.name()))]
    fn stop(&mut self) {
        if self.state == RecorderState::Recording {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.request_stop();
            }
            self.state = RecorderState::Stopping;
            self.wait_for_stop();
            self.state = RecorderState::Stopped;
            // Late chunks can still be drained by save.
            self.release_tracks();
            info!(chunks = self.chunks.len(), "Native recorder stopped");
        }
        self.bus.emit(EncoderEvent::Stop);
    }

    fn save(&mut self, callback: SaveCallback) {
        self.drain();
        if self.chunks.is_empty() {
            self.bus.error(
                EncoderError::NoData("the recorder produced no data".to_string()).to_string(),
            );
            return;
        }

        let mut data = BytesMut::with_capacity(self.chunks.iter().map(Bytes::len).sum());
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }

        let artifact = Artifact::new(data.freeze(), self.settings.format, self.settings.name.clone());
        info!(size = artifact.len(), chunks = self.chunks.len(), "Native recording saved");
        callback(artifact);
    }

    fn dispose(&mut self) {
        if self.state.is_active() {
            if let Some(recorder) = self.recorder.as_mut() {
                recorder.request_stop();
            }
            self.state = RecorderState::Stopped;
        }
        self.release();
        self.chunks.clear();
        self.bus.dispose();
    }

    fn events(&self) -> &EventBus {
        &self.bus
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn name(&self) -> &'static str {
        "webm-native"
    }
}
