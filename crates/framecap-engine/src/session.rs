//! The capture session controller.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, instrument, trace, warn};

use framecap_capture::{Frame, LogicalClock, MotionBlur};
use framecap_encoder::{
    create_encoder, Artifact, ArtifactSink, Backends, Encoder, EncoderSettings, SaveCallback,
};
use framecap_ipc::{
    CaptureConfig, EncoderEvent, EventKind, SessionEvent, SessionState, SessionStats, StopReason,
};

use crate::display::StatusDisplay;
use crate::error::SessionError;
use crate::metrics::StatsCollector;
use crate::state::{publish, StateTracker};
use crate::time::{TimeSource, WallClock};
use crate::SessionResult;

/// Callback receiving encoder progress (0.0 - 1.0).
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Counts and announces artifacts before handing them on.
struct ObservedSink {
    inner: Arc<dyn ArtifactSink>,
    stats: Arc<StatsCollector>,
    event_tx: Sender<SessionEvent>,
}

impl ArtifactSink for ObservedSink {
    fn deliver(&self, artifact: Artifact) {
        observe_artifact(&self.stats, &self.event_tx, &artifact);
        self.inner.deliver(artifact);
    }
}

fn observe_artifact(stats: &StatsCollector, event_tx: &Sender<SessionEvent>, artifact: &Artifact) {
    stats.record_artifact();
    info!(name = %artifact.file_name(), size = artifact.len(), "Artifact delivered");
    publish(
        event_tx,
        SessionEvent::ArtifactDelivered {
            name: artifact.file_name(),
            size: artifact.len(),
        },
    );
}

/// Builder for [`CaptureSession`].
pub struct SessionBuilder {
    config: CaptureConfig,
    backends: Backends,
    on_progress: Option<ProgressCallback>,
    time: Arc<dyn TimeSource>,
}

impl SessionBuilder {
    /// Use `backends` instead of the defaults.
    pub fn backends(mut self, backends: Backends) -> Self {
        self.backends = backends;
        self
    }

    /// Receive encoder progress.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(f32) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Measure time limits with `time` instead of the wall clock.
    pub fn time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Create the session and its encoder.
    ///
    /// Fails if the configured format's encoding library is unavailable.
    pub fn build(self) -> SessionResult<CaptureSession> {
        CaptureSession::new(self)
    }
}

/// Samples frames at a fixed logical rate into one encoder.
///
/// The configuration is fixed at construction. Encoder failures during
/// capture are logged and published as [`SessionEvent::Error`]; only
/// operations on a disposed session return errors.
pub struct CaptureSession {
    config: CaptureConfig,
    encoder: Option<Box<dyn Encoder>>,
    tracker: StateTracker,
    stats: Arc<StatsCollector>,
    sink: Arc<dyn ArtifactSink>,
    time: Arc<dyn TimeSource>,
    clock: LogicalClock,
    blur: MotionBlur,
    display: Option<StatusDisplay>,
    paused: bool,
}

impl CaptureSession {
    /// Start building a session for `config`.
    pub fn builder(config: CaptureConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            backends: Backends::default(),
            on_progress: None,
            time: Arc::new(WallClock::new()),
        }
    }

    #[instrument(name = "session_new", skip_all, fields(format = %builder.config.format))]
    fn new(builder: SessionBuilder) -> SessionResult<Self> {
        let SessionBuilder {
            config,
            backends,
            on_progress,
            time,
        } = builder;
        let config = config.validate();

        let tracker = StateTracker::new();
        let stats = Arc::new(StatsCollector::new());
        let sink: Arc<dyn ArtifactSink> = Arc::new(ObservedSink {
            inner: backends.sink(),
            stats: Arc::clone(&stats),
            event_tx: tracker.sender(),
        });
        let backends = backends.with_sink(Arc::clone(&sink));

        let encoder = create_encoder(EncoderSettings::from(&config), &backends)?;
        wire_encoder_events(encoder.as_ref(), on_progress, &stats, tracker.sender());

        let blur_factor = config.blur_factor();
        let clock = LogicalClock::new(config.frame_duration_ms() / f64::from(blur_factor));
        let display = config.display.then(|| StatusDisplay::new(config.format));

        let session = Self {
            encoder: Some(encoder),
            tracker,
            stats,
            sink,
            time,
            clock,
            blur: MotionBlur::new(blur_factor),
            display,
            paused: false,
            config,
        };
        session.announce("Capture session created");
        Ok(session)
    }

    /// Begin recording, then call `callback`.
    ///
    /// The encoder's start has completed when `callback` runs. Starting a
    /// session that is already recording is ignored.
    #[instrument(name = "session_start", skip_all)]
    pub fn start<F>(&mut self, callback: F) -> SessionResult<()>
    where
        F: FnOnce(),
    {
        self.ensure_usable()?;
        if self.tracker.current().is_recording() {
            debug!("Already recording, ignoring start");
            return Ok(());
        }

        self.stats.start(self.time.now_seconds());
        self.clock.reset();
        self.blur.reset();
        self.paused = false;

        let encoder = self.encoder.as_mut().ok_or(SessionError::NoEncoder)?;
        encoder.start();

        self.tracker.transition_to(SessionState::Recording);
        self.announce("Capture started");
        callback();
        Ok(())
    }

    /// Capture one frame.
    ///
    /// Ignored unless recording and not paused. Stops and auto-saves to the
    /// sink once a configured limit is reached.
    pub fn capture(&mut self, frame: &Frame) -> SessionResult<()> {
        self.ensure_usable()?;
        if !self.tracker.current().is_recording() {
            trace!(state = %self.tracker.current().name(), "Not recording, frame ignored");
            return Ok(());
        }
        if self.paused {
            trace!("Paused, frame ignored");
            return Ok(());
        }

        let now_ms = self.clock.advance();
        if !self.blur.is_passthrough() {
            self.stats.record_subframe();
        }
        let frame = match self.blur.push(frame) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(e) => {
                self.report_error(e.to_string());
                return Ok(());
            }
        };

        let count = self.stats.record_frame();
        let frame = frame.stamped(count - 1, now_ms);
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.add(&frame);
        }
        self.tracker.send_event(SessionEvent::FrameCaptured { count });

        if self.config.verbose {
            info!(count, logical_ms = now_ms, "Frame captured");
        } else {
            trace!(count, logical_ms = now_ms, "Frame captured");
        }
        self.refresh_display();

        if let Some(reason) = self.limit_reached(count) {
            info!(reason = %reason.message(), "Capture limit reached");
            self.stop_with(reason);
            self.save_to_sink();
        }
        Ok(())
    }

    /// Stop recording. Returns once the encoder has flushed its buffers.
    pub fn stop(&mut self) -> SessionResult<()> {
        self.ensure_usable()?;
        self.stop_with(StopReason::UserRequested);
        Ok(())
    }

    /// Hand the encoder's artifact to `callback`, now or when it is ready.
    #[instrument(name = "session_save", skip_all)]
    pub fn save<F>(&mut self, callback: F) -> SessionResult<()>
    where
        F: FnOnce(Artifact) + Send + 'static,
    {
        self.ensure_usable()?;
        let stats = Arc::clone(&self.stats);
        let event_tx = self.tracker.sender();
        let encoder = self.encoder.as_mut().ok_or(SessionError::NoEncoder)?;

        encoder.save(Box::new(move |artifact| {
            observe_artifact(&stats, &event_tx, &artifact);
            callback(artifact);
        }));
        Ok(())
    }

    /// Ignore frames until [`resume`](Self::resume).
    pub fn pause(&mut self) -> SessionResult<()> {
        self.ensure_usable()?;
        if !self.paused {
            self.paused = true;
            self.announce("Capture paused");
        }
        Ok(())
    }

    /// Accept frames again after [`pause`](Self::pause).
    pub fn resume(&mut self) -> SessionResult<()> {
        self.ensure_usable()?;
        if self.paused {
            self.paused = false;
            self.announce("Capture resumed");
        }
        Ok(())
    }

    /// Release the encoder and display. Every later operation fails.
    #[instrument(name = "session_dispose", skip_all)]
    pub fn dispose(&mut self) {
        let previous = self.tracker.current();
        if previous.is_disposed() {
            return;
        }

        if let Some(mut encoder) = self.encoder.take() {
            encoder.dispose();
        }
        if previous.is_recording() {
            self.stats.stop(self.time.now_seconds());
            self.tracker
                .send_event(SessionEvent::Stopped(StopReason::Disposed));
        }
        self.display = None;
        self.clock.reset();
        self.blur.reset();
        self.tracker.transition_to(SessionState::Disposed);
        self.announce("Capture session disposed");
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.tracker.current()
    }

    /// Returns true while frames are ignored by [`pause`](Self::pause).
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The validated configuration.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Name of the encoder, until disposed.
    pub fn encoder_name(&self) -> Option<&'static str> {
        self.encoder.as_ref().map(|encoder| encoder.name())
    }

    /// Frames forwarded to the encoder since start.
    pub fn frames(&self) -> u64 {
        self.stats.frames()
    }

    /// Receiver for session events.
    pub fn events(&self) -> Receiver<SessionEvent> {
        self.tracker.receiver()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> SessionStats {
        self.stats
            .snapshot(self.time.now_seconds(), self.clock.now_ms())
    }

    /// Status text, when the display is enabled.
    pub fn status_text(&self) -> Option<&str> {
        self.display.as_ref().map(StatusDisplay::text)
    }

    /// The logical clock captured animations run on.
    pub fn clock(&self) -> &LogicalClock {
        &self.clock
    }

    /// Mutable access for scheduling timers on the logical clock.
    pub fn clock_mut(&mut self) -> &mut LogicalClock {
        &mut self.clock
    }

    fn ensure_usable(&self) -> SessionResult<()> {
        if self.tracker.current().is_disposed() {
            return Err(SessionError::Disposed);
        }
        Ok(())
    }

    fn limit_reached(&self, count: u64) -> Option<StopReason> {
        if self.config.has_time_limit() {
            let seconds = self.stats.elapsed(self.time.now_seconds());
            if seconds >= self.config.time_limit {
                return Some(StopReason::TimeLimit { seconds });
            }
        }
        if self.config.has_frame_limit() && count >= self.config.frame_limit {
            return Some(StopReason::FrameLimit { frames: count });
        }
        None
    }

    #[instrument(name = "session_stop", skip(self))]
    fn stop_with(&mut self, reason: StopReason) {
        if !self.tracker.current().is_recording() {
            debug!("Not recording, ignoring stop");
            return;
        }

        self.tracker.transition_to(SessionState::Stopping);
        self.stats.stop(self.time.now_seconds());
        if self.blur.pending() > 0 {
            debug!(pending = self.blur.pending(), "Discarding partial blur accumulation");
        }
        self.blur.reset();

        if let Some(encoder) = self.encoder.as_mut() {
            encoder.stop();
        }

        self.tracker.transition_to(SessionState::Stopped);
        if let Some(status) = self.display.as_mut() {
            status.finish(&reason.message());
        }
        self.announce(&reason.message());
        self.tracker.send_event(SessionEvent::Stopped(reason));
    }

    fn save_to_sink(&mut self) {
        let sink = Arc::clone(&self.sink);
        let callback: SaveCallback = Box::new(move |artifact| sink.deliver(artifact));
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.save(callback);
        }
    }

    fn refresh_display(&mut self) {
        if self.display.is_none() {
            return;
        }
        let stats = self.stats();
        if let Some(status) = self.display.as_mut() {
            status.update(&stats, &self.config);
            trace!(status = status.text(), "Display updated");
        }
    }

    fn report_error(&self, message: String) {
        warn!(error = %message, "Capture error");
        self.stats.record_error();
        self.tracker.send_event(SessionEvent::Error { message });
    }

    fn announce(&self, message: &str) {
        if self.config.verbose {
            info!(format = %self.config.format, "{}", message);
        } else {
            debug!(format = %self.config.format, "{}", message);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Route encoder progress and empty saves to the caller and session
/// observers, and log encoder errors.
fn wire_encoder_events(
    encoder: &dyn Encoder,
    on_progress: Option<ProgressCallback>,
    stats: &Arc<StatsCollector>,
    event_tx: Sender<SessionEvent>,
) {
    let skipped_tx = event_tx.clone();
    encoder.on(
        EventKind::NothingToSave,
        Arc::new(move |event: &EncoderEvent| {
            if let EncoderEvent::NothingToSave { reason } = event {
                info!(reason = %reason, "Nothing left to save");
                publish(
                    &skipped_tx,
                    SessionEvent::NothingToSave {
                        reason: reason.clone(),
                    },
                );
            }
        }),
    );

    let progress_tx = event_tx.clone();
    encoder.on(
        EventKind::Progress,
        Arc::new(move |event: &EncoderEvent| {
            if let EncoderEvent::Progress(fraction) = event {
                if let Some(callback) = &on_progress {
                    callback(*fraction);
                }
                publish(&progress_tx, SessionEvent::Progress(*fraction));
            }
        }),
    );

    let stats = Arc::clone(stats);
    let name = encoder.name();
    encoder.on(
        EventKind::Error,
        Arc::new(move |event: &EncoderEvent| {
            if let EncoderEvent::Error { message } = event {
                warn!(encoder = name, error = %message, "Encoder error");
                stats.record_error();
                publish(
                    &event_tx,
                    SessionEvent::Error {
                        message: message.clone(),
                    },
                );
            }
        }),
    );
}
