//! PNG and JPEG image-sequence encoders.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::PngEncoder;
use ::image::{ExtendedColorType, ImageEncoder, RgbaImage};
use tracing::{debug, instrument, trace};

use framecap_capture::Frame;
use framecap_ipc::EncoderEvent;

use crate::archive::{ArchiveEncoder, ArchiveFactory};
use crate::events::EventBus;
use crate::sink::ArtifactSink;
use crate::{EncoderError, EncoderResult, EncoderSettings, Encoder, SaveCallback};

/// Image format of a sequence entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Lossless PNG.
    Png,

    /// Lossy JPEG using the configured quality.
    Jpeg,
}

impl ImageKind {
    /// Extension of archive entries.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Converts a frame into a compressed image blob.
pub trait FrameConverter: Send + Sync {
    /// Encode `frame` as `kind` at `quality` (0 - 100, ignored by PNG).
    fn convert(&self, frame: &Frame, kind: ImageKind, quality: u8) -> EncoderResult<Bytes>;
}

/// Converter backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageConverter;

impl FrameConverter for ImageConverter {
    fn convert(&self, frame: &Frame, kind: ImageKind, quality: u8) -> EncoderResult<Bytes> {
        let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or_else(|| {
                EncoderError::Conversion(format!(
                    "{} bytes do not form a {}x{} RGBA image",
                    frame.data.len(),
                    frame.width,
                    frame.height
                ))
            })?;

        let mut out = Cursor::new(Vec::new());
        match kind {
            ImageKind::Png => PngEncoder::new(&mut out)
                .write_image(
                    rgba.as_raw(),
                    frame.width,
                    frame.height,
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| EncoderError::Conversion(format!("PNG encode failed: {e}")))?,
            ImageKind::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = ::image::DynamicImage::ImageRgba8(rgba).to_rgb8();
                JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                    .write_image(rgb.as_raw(), frame.width, frame.height, ExtendedColorType::Rgb8)
                    .map_err(|e| EncoderError::Conversion(format!("JPEG encode failed: {e}")))?
            }
        }

        Ok(Bytes::from(out.into_inner()))
    }
}

/// Encoder converting each frame to an image and archiving it.
pub struct ImageSequenceEncoder {
    kind: ImageKind,
    quality: u8,
    converter: Arc<dyn FrameConverter>,
    archive: ArchiveEncoder,
    bus: EventBus,
}

impl ImageSequenceEncoder {
    /// Create a sequence encoder for `settings.format` (PNG unless JPEG).
    pub fn new(
        settings: EncoderSettings,
        factory: ArchiveFactory,
        converter: Arc<dyn FrameConverter>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        let kind = if settings.format == framecap_ipc::CaptureFormat::Jpeg {
            ImageKind::Jpeg
        } else {
            ImageKind::Png
        };
        let quality = settings.quality;
        let bus = EventBus::new();
        let archive = ArchiveEncoder::new(settings, factory, sink, kind.extension(), bus.clone());

        Self {
            kind,
            quality,
            converter,
            archive,
            bus,
        }
    }

    /// Image format of the entries.
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Current archive part.
    pub fn part(&self) -> u32 {
        self.archive.part()
    }
}

impl Encoder for ImageSequenceEncoder {
    #[instrument(name = "image_sequence_start", skip(self), fields(kind = ?self.kind))]
    fn start(&mut self) {
        self.archive.start();
        self.bus.emit(EncoderEvent::Start);
    }

    fn add(&mut self, frame: &Frame) {
        // Conversion completes before the next frame is requested, so
        // entries stay in capture order.
        match self.converter.convert(frame, self.kind, self.quality) {
            Ok(blob) => {
                trace!(sequence = frame.sequence, size = blob.len(), "Converted frame");
                self.archive.add_blob(&blob);
            }
            Err(e) => {
                debug!(sequence = frame.sequence, "Dropping frame: {}", e);
                self.bus.error(e.to_string());
            }
        }
    }

    fn stop(&mut self) {
        self.bus.emit(EncoderEvent::Stop);
    }

    fn save(&mut self, callback: SaveCallback) {
        self.archive.save(callback);
    }

    fn dispose(&mut self) {
        self.archive.dispose();
        self.bus.dispose();
    }

    fn events(&self) -> &EventBus {
        &self.bus
    }

    fn frames(&self) -> u64 {
        self.archive.frames()
    }

    fn name(&self) -> &'static str {
        match self.kind {
            ImageKind::Png => "png-sequence",
            ImageKind::Jpeg => "jpeg-sequence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarArchive;
    use crate::sink::CollectingSink;
    use crate::Artifact;
    use framecap_ipc::{CaptureFormat, EventKind};
    use parking_lot::Mutex;

    struct RejectingConverter {
        reject_sequence: u64,
    }

    impl FrameConverter for RejectingConverter {
        fn convert(&self, frame: &Frame, _kind: ImageKind, _quality: u8) -> EncoderResult<Bytes> {
            if frame.sequence == self.reject_sequence {
                Err(EncoderError::Conversion("canvas tainted".to_string()))
            } else {
                Ok(Bytes::from(vec![frame.sequence as u8]))
            }
        }
    }

    fn entries(artifact: &Artifact) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(artifact.data.as_ref());
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().display().to_string();
                let mut data = Vec::new();
                std::io::Read::read_to_end(&mut entry, &mut data).unwrap();
                (name, data)
            })
            .collect()
    }

    fn save(encoder: &mut ImageSequenceEncoder) -> Option<Artifact> {
        let saved = Arc::new(Mutex::new(None));
        let saved_clone = Arc::clone(&saved);
        encoder.save(Box::new(move |artifact| *saved_clone.lock() = Some(artifact)));
        let artifact = saved.lock().take();
        artifact
    }

    fn settings(format: CaptureFormat) -> EncoderSettings {
        EncoderSettings {
            rate: 10,
            ..EncoderSettings::for_format(format)
        }
    }

    #[test]
    fn test_png_sequence_scenario() {
        let mut encoder = ImageSequenceEncoder::new(
            settings(CaptureFormat::Png),
            TarArchive::factory(),
            Arc::new(ImageConverter),
            Arc::new(CollectingSink::new()),
        );
        encoder.start();
        for i in 0..3u8 {
            encoder.add(&Frame::solid(4, 4, [i * 50, 0, 0, 255]));
        }

        let artifact = save(&mut encoder).unwrap();
        let entries = entries(&artifact);
        let names: Vec<_> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["000000.png", "000001.png", "000002.png"]);

        let decoded = ::image::load_from_memory(&entries[2].1).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 4));
        assert_eq!(decoded.get_pixel(0, 0).0, [100, 0, 0, 255]);
    }

    #[test]
    fn test_jpeg_entries() {
        let mut encoder = ImageSequenceEncoder::new(
            settings(CaptureFormat::Jpeg),
            TarArchive::factory(),
            Arc::new(ImageConverter),
            Arc::new(CollectingSink::new()),
        );
        assert_eq!(encoder.name(), "jpeg-sequence");
        encoder.start();
        encoder.add(&Frame::solid(8, 8, [10, 200, 30, 255]));

        let artifact = save(&mut encoder).unwrap();
        let entries = entries(&artifact);
        assert_eq!(entries[0].0, "000000.jpg");
        assert_eq!(&entries[0].1[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_conversion_failure_drops_frame_without_gap() {
        let mut encoder = ImageSequenceEncoder::new(
            settings(CaptureFormat::Png),
            TarArchive::factory(),
            Arc::new(RejectingConverter { reject_sequence: 1 }),
            Arc::new(CollectingSink::new()),
        );
        let errors = Arc::new(Mutex::new(0));
        let errors_clone = Arc::clone(&errors);
        encoder.on(
            EventKind::Error,
            Arc::new(move |_: &EncoderEvent| *errors_clone.lock() += 1),
        );

        encoder.start();
        for sequence in 0..3 {
            encoder.add(&Frame::solid(1, 1, [0; 4]).stamped(sequence, 0.0));
        }

        assert_eq!(*errors.lock(), 1);
        assert_eq!(encoder.frames(), 2);

        let artifact = save(&mut encoder).unwrap();
        let entries = entries(&artifact);
        assert_eq!(
            entries,
            vec![
                ("000000.png".to_string(), vec![0]),
                ("000001.png".to_string(), vec![2]),
            ]
        );
    }

    #[test]
    fn test_invalid_frame_is_reported() {
        let converter = ImageConverter;
        let frame = Frame::new(Bytes::from_static(&[1, 2, 3]), 2, 2);
        let err = converter.convert(&frame, ImageKind::Png, 100).unwrap_err();
        assert!(matches!(err, EncoderError::Conversion(_)));
    }

    #[test]
    fn test_steps_emitted_per_archived_frame() {
        let mut encoder = ImageSequenceEncoder::new(
            settings(CaptureFormat::Png),
            TarArchive::factory(),
            Arc::new(ImageConverter),
            Arc::new(CollectingSink::new()),
        );
        let steps = Arc::new(Mutex::new(0));
        let steps_clone = Arc::clone(&steps);
        encoder.on(EventKind::Step, Arc::new(move |_: &EncoderEvent| *steps_clone.lock() += 1));

        encoder.start();
        encoder.add(&Frame::solid(2, 2, [0; 4]));
        encoder.add(&Frame::new(Bytes::new(), 2, 2));
        assert_eq!(*steps.lock(), 1);
    }
}
