//! The record command.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use crossbeam_channel::Receiver;
use tracing::{debug, info, instrument, warn};

use framecap_capture::{CaptureError, FrameSource, PatternSource};
use framecap_encoder::{ArtifactSink, Backends};
use framecap_engine::CaptureSession;
use framecap_ipc::{CaptureConfig, CaptureFormat, SessionEvent};

use crate::sink::DirectorySink;

/// Frame limit applied when neither a frame nor a time limit is set.
pub const DEFAULT_FRAME_LIMIT: u64 = 120;

/// Where and how to record.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub out: PathBuf,
    pub width: u32,
    pub height: u32,
    /// End the synthetic source after this many frames.
    pub source_frames: Option<u64>,
    /// How long to wait for the final artifact after stopping.
    pub wait: Duration,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            out: PathBuf::from("out"),
            width: 320,
            height: 180,
            source_frames: None,
            wait: Duration::from_secs(120),
        }
    }
}

/// Outcome of a recording.
#[derive(Debug, Clone)]
pub struct Summary {
    pub format: CaptureFormat,
    pub frames: u64,
    pub artifacts: Vec<PathBuf>,
    pub errors: Vec<String>,
    pub logical_seconds: f64,
    pub elapsed_seconds: f64,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Recorded {} frames as {} ({:.2}s of animation in {:.2}s)",
            self.frames, self.format, self.logical_seconds, self.elapsed_seconds
        )?;
        for path in &self.artifacts {
            writeln!(f, "  {}", path.display())?;
        }
        if !self.errors.is_empty() {
            write!(f, "{} error(s) reported", self.errors.len())?;
        }
        Ok(())
    }
}

/// Tracks session events until the final artifact is in.
#[derive(Debug, Default)]
struct EventMonitor {
    stopped: bool,
    finished: bool,
    errors: Vec<String>,
}

impl EventMonitor {
    fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Stopped(reason) => {
                info!(reason = %reason.message(), "Session stopped");
                self.stopped = true;
            }
            SessionEvent::ArtifactDelivered { name, size } => {
                debug!(name = %name, size, "Artifact delivered");
                self.finished |= self.stopped;
            }
            SessionEvent::NothingToSave { reason } => {
                debug!(reason = %reason, "Final save empty");
                self.finished |= self.stopped;
            }
            SessionEvent::Error { message } => {
                warn!("Encoder error: {}", message);
                self.errors.push(message);
                self.finished |= self.stopped;
            }
            SessionEvent::StateChanged { .. }
            | SessionEvent::FrameCaptured { .. }
            | SessionEvent::Progress(_) => {}
        }
    }

    fn drain(&mut self, events: &Receiver<SessionEvent>) {
        while let Ok(event) = events.try_recv() {
            self.handle(event);
        }
    }

    /// Block until the post-stop artifact or error arrives. Returns false
    /// on timeout.
    fn wait_for_output(&mut self, events: &Receiver<SessionEvent>, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.drain(events);
        while !self.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(event) => self.handle(event),
                Err(_) => return false,
            }
        }
        true
    }
}

/// Record a synthetic moving gradient with `config`, writing artifacts
/// under `options.out`.
#[instrument(skip_all, fields(format = %config.format))]
pub fn record(mut config: CaptureConfig, options: &RecordOptions) -> anyhow::Result<Summary> {
    if !config.has_frame_limit() && !config.has_time_limit() && options.source_frames.is_none() {
        warn!(frames = DEFAULT_FRAME_LIMIT, "No capture limit configured, using default");
        config.frame_limit = DEFAULT_FRAME_LIMIT;
    }

    let format = config.format;
    let started = Instant::now();
    let sink = Arc::new(DirectorySink::new(&options.out)?);
    let backends = Backends::default().with_sink(Arc::clone(&sink) as Arc<dyn ArtifactSink>);

    let mut session = CaptureSession::builder(config)
        .backends(backends)
        .on_progress(|fraction| debug!(progress = fraction, "Encoding"))
        .build()
        .with_context(|| format!("Failed to create {format} session"))?;
    let events = session.events();
    let mut monitor = EventMonitor::default();

    let mut source = PatternSource::new(options.width, options.height);
    if let Some(frames) = options.source_frames {
        source = source.with_frame_count(frames);
    }

    session.start(|| info!(width = options.width, height = options.height, "Recording"))?;

    while session.state().is_recording() {
        let frame = match source.next_frame(session.clock().now_ms()) {
            Ok(frame) => frame,
            Err(CaptureError::SourceExhausted) => {
                info!("Source exhausted, stopping");
                session.stop()?;
                let sink = Arc::clone(&sink);
                session.save(move |artifact| sink.deliver(artifact))?;
                break;
            }
            Err(e) => return Err(e).context("Failed to render frame"),
        };
        session.capture(&frame)?;
        monitor.drain(&events);
    }

    if !monitor.wait_for_output(&events, options.wait) {
        bail!("Timed out after {:?} waiting for the {format} encoder", options.wait);
    }

    let stats = session.stats();
    session.dispose();

    let artifacts = sink.written();
    if artifacts.is_empty() {
        match monitor.errors.first() {
            Some(message) => bail!("No {format} output written: {message}"),
            None => bail!("No {format} output written"),
        }
    }

    Ok(Summary {
        format,
        frames: stats.frames_captured,
        artifacts,
        errors: monitor.errors,
        logical_seconds: stats.logical_ms / 1000.0,
        elapsed_seconds: started.elapsed().as_secs_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn options(out: &std::path::Path) -> RecordOptions {
        RecordOptions {
            out: out.to_path_buf(),
            width: 16,
            height: 8,
            source_frames: None,
            wait: Duration::from_secs(30),
        }
    }

    fn config(format: CaptureFormat, frames: u64) -> CaptureConfig {
        CaptureConfig {
            frame_limit: frames,
            rate: 10,
            ..CaptureConfig::new(format)
        }
    }

    fn tar_entries(path: &std::path::Path) -> Vec<String> {
        let mut archive = tar::Archive::new(File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|entry| entry.unwrap().path().unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn test_png_frame_limit() {
        let dir = tempfile::tempdir().unwrap();
        let summary = record(config(CaptureFormat::Png, 5), &options(dir.path())).unwrap();

        assert_eq!(summary.frames, 5);
        assert_eq!(summary.artifacts, vec![dir.path().join("capture.tar")]);
        assert_eq!(tar_entries(&summary.artifacts[0]).len(), 5);
        assert!((summary.logical_seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_exhausted_source_saves() {
        let dir = tempfile::tempdir().unwrap();
        let opts = RecordOptions {
            source_frames: Some(3),
            ..options(dir.path())
        };
        let summary = record(config(CaptureFormat::Jpeg, 0), &opts).unwrap();

        assert_eq!(summary.frames, 3);
        assert_eq!(tar_entries(&dir.path().join("capture.tar")).len(), 3);
    }

    #[test]
    fn test_gif_written() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CaptureConfig {
            workers: 2,
            name: "anim".to_string(),
            ..config(CaptureFormat::Gif, 4)
        };
        let summary = record(cfg, &options(dir.path())).unwrap();

        let path = dir.path().join("anim.gif");
        assert_eq!(summary.artifacts, vec![path.clone()]);
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(&bytes[..6], b"GIF89a");
    }

    #[test]
    fn test_auto_save_parts() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CaptureConfig {
            auto_save_time: 0.2,
            ..config(CaptureFormat::Png, 5)
        };
        let summary = record(cfg, &options(dir.path())).unwrap();

        let names: Vec<_> = summary
            .artifacts
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["capture-part-01.tar", "capture-part-02.tar", "capture-part-03.tar"]
        );
    }

    #[test]
    fn test_auto_save_ending_on_part_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = CaptureConfig {
            auto_save_time: 0.2,
            ..config(CaptureFormat::Png, 4)
        };
        let summary = record(cfg, &options(dir.path())).unwrap();

        assert_eq!(
            summary.artifacts,
            vec![
                dir.path().join("capture-part-01.tar"),
                dir.path().join("capture-part-02.tar")
            ]
        );
        assert!(summary.errors.is_empty());
        assert!(!summary.to_string().contains("error"));
    }

    #[test]
    fn test_software_webm_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = record(config(CaptureFormat::WebmSoftware, 3), &options(dir.path())).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to create webm session"));
    }

    #[test]
    fn test_native_webm_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = record(config(CaptureFormat::WebmNative, 3), &options(dir.path())).unwrap_err();
        assert!(err.to_string().starts_with("No webm-native output written"));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_default_frame_limit() {
        let dir = tempfile::tempdir().unwrap();
        let summary = record(config(CaptureFormat::Png, 0), &options(dir.path())).unwrap();
        assert_eq!(summary.frames, DEFAULT_FRAME_LIMIT);
    }

    #[test]
    fn test_summary_text() {
        let summary = Summary {
            format: CaptureFormat::Gif,
            frames: 60,
            artifacts: vec![PathBuf::from("out/capture.gif")],
            errors: Vec::new(),
            logical_seconds: 2.0,
            elapsed_seconds: 0.25,
        };
        assert_eq!(
            summary.to_string(),
            "Recorded 60 frames as gif (2.00s of animation in 0.25s)\n  out/capture.gif\n"
        );
    }
}
