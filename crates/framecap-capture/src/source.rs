//! Frame sources.

use bytes::Bytes;

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::{CaptureResult, FrameSource};

/// Synthetic source drawing a diagonal gradient that scrolls with time.
#[derive(Debug, Clone)]
pub struct PatternSource {
    width: u32,
    height: u32,
    /// Horizontal scroll speed in pixels per second.
    speed: f64,
    remaining: Option<u64>,
}

impl PatternSource {
    /// Create an endless pattern source.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            speed: 120.0,
            remaining: None,
        }
    }

    /// Stop producing frames after `frames` frames.
    pub fn with_frame_count(mut self, frames: u64) -> Self {
        self.remaining = Some(frames);
        self
    }

    /// Set the scroll speed in pixels per second.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    fn render(&self, time_ms: f64) -> Vec<u8> {
        let offset = (time_ms / 1000.0 * self.speed) as i64;
        let (w, h) = (self.width as i64, self.height as i64);
        let mut data = Vec::with_capacity(Frame::rgba_buffer_size(self.width, self.height));

        for y in 0..h {
            for x in 0..w {
                let shifted = (x + offset).rem_euclid(w);
                let r = (shifted * 255 / w.max(1)) as u8;
                let g = (y * 255 / h.max(1)) as u8;
                let b = ((shifted + y) * 255 / (w + h).max(1)) as u8;
                data.extend_from_slice(&[r, g, b, 255]);
            }
        }

        data
    }
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self, time_ms: f64) -> CaptureResult<Frame> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(CaptureError::SourceExhausted);
            }
            *remaining -= 1;
        }

        Ok(Frame::new(
            Bytes::from(self.render(time_ms)),
            self.width,
            self.height,
        ))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_frames_are_valid() {
        let mut source = PatternSource::new(8, 4);
        let frame = source.next_frame(0.0).unwrap();
        assert!(frame.is_valid());
        assert_eq!(source.dimensions(), (8, 4));
    }

    #[test]
    fn test_pattern_moves_with_time() {
        let mut source = PatternSource::new(16, 2).with_speed(1000.0);
        let a = source.next_frame(0.0).unwrap();
        let b = source.next_frame(5.0).unwrap();
        assert_ne!(a.data, b.data);
    }

    #[test]
    fn test_frame_count_exhausts() {
        let mut source = PatternSource::new(2, 2).with_frame_count(2);
        assert!(source.next_frame(0.0).is_ok());
        assert!(source.next_frame(1.0).is_ok());
        assert!(matches!(
            source.next_frame(2.0),
            Err(CaptureError::SourceExhausted)
        ));
    }
}
