//! Motion blur by averaging consecutive sub-frames.

use bytes::Bytes;
use tracing::trace;

use crate::error::CaptureError;
use crate::frame::Frame;
use crate::CaptureResult;

/// Box-filter accumulator that folds `factor` sub-frames into one frame.
///
/// With a factor of 0 or 1 every frame passes straight through.
#[derive(Debug)]
pub struct MotionBlur {
    factor: u32,
    accumulator: Vec<u32>,
    dimensions: Option<(u32, u32)>,
    pending: u32,
}

impl MotionBlur {
    /// Create an accumulator that averages `factor` sub-frames.
    pub fn new(factor: u32) -> Self {
        Self {
            factor: factor.max(1),
            accumulator: Vec::new(),
            dimensions: None,
            pending: 0,
        }
    }

    /// Returns true if frames pass through unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.factor <= 1
    }

    /// Sub-frames accumulated toward the next output frame.
    pub fn pending(&self) -> u32 {
        self.pending
    }

    /// Add a sub-frame. Returns the blended frame once `factor` sub-frames
    /// have been accumulated.
    ///
    /// A sub-frame whose size differs from the ones already accumulated
    /// discards the partial accumulation and returns an error.
    pub fn push(&mut self, frame: &Frame) -> CaptureResult<Option<Frame>> {
        if self.is_passthrough() {
            return Ok(Some(frame.clone()));
        }

        if !frame.is_valid() {
            return Err(CaptureError::InvalidBuffer {
                width: frame.width,
                height: frame.height,
                expected: Frame::rgba_buffer_size(frame.width, frame.height),
                actual: frame.data.len(),
            });
        }

        match self.dimensions {
            Some(expected) if expected != frame.dimensions() => {
                self.reset();
                return Err(CaptureError::SizeMismatch {
                    expected,
                    actual: frame.dimensions(),
                });
            }
            Some(_) => {}
            None => {
                self.dimensions = Some(frame.dimensions());
                self.accumulator.clear();
                self.accumulator.resize(frame.data.len(), 0);
            }
        }

        for (sum, &value) in self.accumulator.iter_mut().zip(frame.data.iter()) {
            *sum += u32::from(value);
        }
        self.pending += 1;
        trace!(pending = self.pending, factor = self.factor, "Accumulated sub-frame");

        if self.pending < self.factor {
            return Ok(None);
        }

        let divisor = self.pending;
        let data: Vec<u8> = self
            .accumulator
            .iter()
            .map(|&sum| ((sum + divisor / 2) / divisor) as u8)
            .collect();

        let mut blended = Frame::new(Bytes::from(data), frame.width, frame.height);
        blended.timestamp = frame.timestamp;
        blended.sequence = frame.sequence;

        self.reset();
        Ok(Some(blended))
    }

    /// Drop any partially accumulated sub-frames.
    pub fn reset(&mut self) {
        self.accumulator.clear();
        self.dimensions = None;
        self.pending = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let mut blur = MotionBlur::new(0);
        assert!(blur.is_passthrough());
        let frame = Frame::solid(2, 2, [10, 20, 30, 255]);
        let out = blur.push(&frame).unwrap().unwrap();
        assert_eq!(out.data, frame.data);
    }

    #[test]
    fn test_averages_subframes() {
        let mut blur = MotionBlur::new(2);
        assert!(blur.push(&Frame::solid(1, 1, [0, 100, 200, 255])).unwrap().is_none());
        assert_eq!(blur.pending(), 1);

        let out = blur
            .push(&Frame::solid(1, 1, [100, 100, 0, 255]))
            .unwrap()
            .unwrap();
        assert_eq!(out.data.as_ref(), &[50, 100, 100, 255]);
        assert_eq!(blur.pending(), 0);
    }

    #[test]
    fn test_rounds_to_nearest() {
        let mut blur = MotionBlur::new(3);
        blur.push(&Frame::solid(1, 1, [0, 0, 0, 0])).unwrap();
        blur.push(&Frame::solid(1, 1, [1, 1, 2, 0])).unwrap();
        let out = blur.push(&Frame::solid(1, 1, [1, 2, 2, 0])).unwrap().unwrap();
        assert_eq!(out.data.as_ref(), &[1, 1, 1, 0]);
    }

    #[test]
    fn test_size_mismatch_resets() {
        let mut blur = MotionBlur::new(2);
        blur.push(&Frame::solid(1, 1, [0; 4])).unwrap();
        let err = blur.push(&Frame::solid(2, 1, [0; 4])).unwrap_err();
        assert!(matches!(err, CaptureError::SizeMismatch { .. }));
        assert_eq!(blur.pending(), 0);
    }
}
