//! Textual status display.

use framecap_ipc::{CaptureConfig, CaptureFormat, SessionStats};

/// One-line status text refreshed on every captured frame.
#[derive(Debug, Clone)]
pub struct StatusDisplay {
    format: CaptureFormat,
    text: String,
}

impl StatusDisplay {
    pub fn new(format: CaptureFormat) -> Self {
        Self {
            format,
            text: format!("{format} | idle"),
        }
    }

    /// Recompute the text from `stats`, estimating time left toward the
    /// configured limits.
    pub fn update(&mut self, stats: &SessionStats, config: &CaptureConfig) {
        let mut text = format!(
            "{} | {} frames | {:.2}s",
            self.format, stats.frames_captured, stats.elapsed_seconds
        );

        if config.has_frame_limit() {
            text.push_str(&format!(" | {}/{}", stats.frames_captured, config.frame_limit));
        }
        if let Some(eta) = eta_seconds(stats, config) {
            text.push_str(&format!(" | ETA {eta:.1}s"));
        }

        self.text = text;
    }

    /// Mark the display as stopped.
    pub fn finish(&mut self, message: &str) {
        self.text = format!("{} | {}", self.format, message);
    }

    /// Current text.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Seconds until the nearest limit, if any limit is configured.
fn eta_seconds(stats: &SessionStats, config: &CaptureConfig) -> Option<f64> {
    let by_time = config
        .has_time_limit()
        .then(|| (config.time_limit - stats.elapsed_seconds).max(0.0));

    let by_frames = if config.has_frame_limit() && stats.frames_captured > 0 {
        let remaining = config.frame_limit.saturating_sub(stats.frames_captured) as f64;
        let per_frame = stats.elapsed_seconds / stats.frames_captured as f64;
        Some(remaining * per_frame)
    } else {
        None
    };

    match (by_time, by_frames) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(frames: u64, elapsed: f64) -> SessionStats {
        SessionStats {
            frames_captured: frames,
            elapsed_seconds: elapsed,
            ..Default::default()
        }
    }

    #[test]
    fn test_text_without_limits() {
        let mut display = StatusDisplay::new(CaptureFormat::Gif);
        assert_eq!(display.text(), "gif | idle");

        display.update(&stats(12, 0.5), &CaptureConfig::new(CaptureFormat::Gif));
        assert_eq!(display.text(), "gif | 12 frames | 0.50s");
    }

    #[test]
    fn test_eta_toward_frame_limit() {
        let config = CaptureConfig {
            frame_limit: 40,
            ..CaptureConfig::new(CaptureFormat::Png)
        };
        let mut display = StatusDisplay::new(CaptureFormat::Png);
        display.update(&stats(10, 1.0), &config);
        assert_eq!(display.text(), "png | 10 frames | 1.00s | 10/40 | ETA 3.0s");
    }

    #[test]
    fn test_eta_uses_nearest_limit() {
        let config = CaptureConfig {
            frame_limit: 100,
            time_limit: 2.0,
            ..CaptureConfig::new(CaptureFormat::Png)
        };
        assert_eq!(eta_seconds(&stats(10, 1.5), &config), Some(0.5));
    }
}
