//! Command-line arguments.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use framecap_ipc::{CaptureConfig, CaptureFormat};

use crate::commands::RecordOptions;

/// Record a synthetic animation to PNG/JPEG archives, WebM or GIF.
#[derive(Debug, Parser)]
#[command(name = "framecap", version, about)]
pub struct Cli {
    /// Output format: png, jpg, webm, webm-native or gif
    #[arg(short, long, env = "FRAMECAP_FORMAT")]
    pub format: Option<CaptureFormat>,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Stop after this many captured seconds
    #[arg(long)]
    pub time_limit: Option<f64>,

    /// Logical frames per second
    #[arg(short, long)]
    pub rate: Option<u32>,

    /// Output quality (0 - 100)
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Sub-frames averaged into each output frame
    #[arg(long)]
    pub motion_blur: Option<u32>,

    /// Rotate archives every this many seconds
    #[arg(long)]
    pub auto_save: Option<f64>,

    /// Workers for the GIF quantizer pool
    #[arg(long)]
    pub workers: Option<usize>,

    /// Base name of written artifacts
    #[arg(short, long)]
    pub name: Option<String>,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    pub out: PathBuf,

    /// Frame width in pixels
    #[arg(long, default_value_t = 320)]
    pub width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = 180)]
    pub height: u32,

    /// End the synthetic source after this many frames
    #[arg(long)]
    pub source_frames: Option<u64>,

    /// Seconds to wait for the final artifact
    #[arg(long, default_value_t = 120)]
    pub wait: u64,

    /// Keep a status line and log every frame
    #[arg(long)]
    pub display: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Load the configuration file, if any, and apply flag overrides.
    pub fn load_config(&self) -> anyhow::Result<CaptureConfig> {
        let base = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => CaptureConfig::new(CaptureFormat::Gif),
        };
        Ok(self.apply(base))
    }

    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, mut config: CaptureConfig) -> CaptureConfig {
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(frames) = self.frames {
            config.frame_limit = frames;
        }
        if let Some(seconds) = self.time_limit {
            config.time_limit = seconds;
        }
        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(frames) = self.motion_blur {
            config.motion_blur_frames = frames;
        }
        if let Some(seconds) = self.auto_save {
            config.auto_save_time = seconds;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        config.verbose |= self.verbose;
        config.display |= self.display;
        config
    }

    pub fn record_options(&self) -> RecordOptions {
        RecordOptions {
            out: self.out.clone(),
            width: self.width,
            height: self.height,
            source_frames: self.source_frames,
            wait: Duration::from_secs(self.wait),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("framecap").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_flags_build_config() {
        let cli = parse(&["--format", "gif", "--frames", "60", "--rate", "30", "--out", "./out"]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.format, CaptureFormat::Gif);
        assert_eq!(config.frame_limit, 60);
        assert_eq!(config.rate, 30);
        assert_eq!(cli.out, PathBuf::from("./out"));
        assert_eq!(config.name, "capture");
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{ "rate": 12, "quality": 50, "format": "jpg", "name": "demo" }"#).unwrap();

        let cli = parse(&["--config", path.to_str().unwrap(), "--rate", "30"]);
        let config = cli.load_config().unwrap();

        assert_eq!(config.rate, 30);
        assert_eq!(config.quality, 50);
        assert_eq!(config.format, CaptureFormat::Jpeg);
        assert_eq!(config.name, "demo");
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = Cli::try_parse_from(["framecap", "--format", "avi"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["--config", "/nonexistent/framecap.json"]);
        let err = cli.load_config().unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
