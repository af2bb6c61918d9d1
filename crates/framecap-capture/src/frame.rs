//! Captured frame types.

use bytes::Bytes;
use std::time::Instant;

use crate::error::CaptureError;
use crate::CaptureResult;

/// Timestamp for a captured frame.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTimestamp {
    /// Monotonic timestamp when the frame was captured.
    pub capture_time: Instant,

    /// Logical time of the frame in milliseconds since session start.
    pub logical_ms: f64,
}

impl CaptureTimestamp {
    /// Create a timestamp for the given logical time.
    pub fn at(logical_ms: f64) -> Self {
        Self {
            capture_time: Instant::now(),
            logical_ms,
        }
    }
}

impl Default for CaptureTimestamp {
    fn default() -> Self {
        Self::at(0.0)
    }
}

/// A canvas-like frame: straight RGBA8 pixels, row-major, no padding.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGBA pixel data.
    pub data: Bytes,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Capture timestamp.
    pub timestamp: CaptureTimestamp,

    /// Monotonically increasing sequence number, assigned by the session.
    pub sequence: u64,
}

impl Frame {
    /// Create a new frame without validating the buffer.
    pub fn new(data: Bytes, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: CaptureTimestamp::default(),
            sequence: 0,
        }
    }

    /// Create a frame from an RGBA buffer, checking it matches the dimensions.
    pub fn from_rgba(data: impl Into<Bytes>, width: u32, height: u32) -> CaptureResult<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptyFrame { width, height });
        }

        let data = data.into();
        let expected = Self::rgba_buffer_size(width, height);
        if data.len() != expected {
            return Err(CaptureError::InvalidBuffer {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self::new(data, width, height))
    }

    /// Create a frame filled with a single color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self::new(Bytes::from(data), width, height)
    }

    /// Calculate expected RGBA buffer size for given dimensions.
    pub fn rgba_buffer_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * 4
    }

    /// Validate that the frame data matches expected dimensions.
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == Self::rgba_buffer_size(self.width, self.height)
    }

    /// Frame dimensions as (width, height).
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Return a copy tagged with the given sequence number and logical time.
    pub fn stamped(mut self, sequence: u64, logical_ms: f64) -> Self {
        self.sequence = sequence;
        self.timestamp = CaptureTimestamp::at(logical_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_validates_size() {
        let frame = Frame::from_rgba(vec![0u8; 2 * 3 * 4], 2, 3).unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.dimensions(), (2, 3));

        let err = Frame::from_rgba(vec![0u8; 5], 2, 3).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidBuffer {
                expected: 24,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_from_rgba_rejects_empty() {
        let err = Frame::from_rgba(Vec::<u8>::new(), 0, 4).unwrap_err();
        assert!(matches!(err, CaptureError::EmptyFrame { .. }));
    }

    #[test]
    fn test_solid_frame() {
        let frame = Frame::solid(2, 2, [1, 2, 3, 4]);
        assert!(frame.is_valid());
        assert_eq!(&frame.data[..8], &[1, 2, 3, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn test_stamped() {
        let frame = Frame::solid(1, 1, [0; 4]).stamped(7, 116.5);
        assert_eq!(frame.sequence, 7);
        assert!((frame.timestamp.logical_ms - 116.5).abs() < f64::EPSILON);
    }
}
