//! Numbered-entry archives with optional auto-save rotation.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, instrument, trace};

use framecap_ipc::EncoderEvent;

use crate::events::EventBus;
use crate::sink::ArtifactSink;
use crate::{Artifact, EncoderError, EncoderSettings, SaveCallback};

/// Digits in a zero-padded entry name.
const ENTRY_NAME_DIGITS: usize = 6;

/// Writer that accumulates named binary entries into one serialized buffer.
pub trait ArchiveWriter: Send {
    /// Append an entry.
    fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()>;

    /// Serialize everything appended so far. The writer stays usable.
    fn finish(&mut self) -> io::Result<Bytes>;

    /// Number of entries appended.
    fn entries(&self) -> usize;
}

/// Creates a fresh, empty archive writer.
pub type ArchiveFactory = Arc<dyn Fn() -> Box<dyn ArchiveWriter> + Send + Sync>;

/// Tar archive held in memory.
pub struct TarArchive {
    builder: tar::Builder<Vec<u8>>,
    entries: usize,
    mtime: u64,
}

impl TarArchive {
    /// Create an empty archive.
    pub fn new() -> Self {
        let mtime = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            builder: tar::Builder::new(Vec::new()),
            entries: 0,
            mtime,
        }
    }

    /// Factory producing empty tar archives.
    pub fn factory() -> ArchiveFactory {
        Arc::new(|| Box::new(TarArchive::new()) as Box<dyn ArchiveWriter>)
    }
}

impl Default for TarArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter for TarArchive {
    fn append(&mut self, name: &str, data: &[u8]) -> io::Result<()> {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(self.mtime);
        header.set_entry_type(tar::EntryType::Regular);
        self.builder.append_data(&mut header, name, data)?;
        self.entries += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<Bytes> {
        // Two zero blocks terminate a tar stream.
        let written = self.builder.get_ref();
        let mut out = Vec::with_capacity(written.len() + 1024);
        out.extend_from_slice(written);
        out.resize(written.len() + 1024, 0);
        Ok(Bytes::from(out))
    }

    fn entries(&self) -> usize {
        self.entries
    }
}

/// Zero-padded entry name for the `index`-th entry.
pub(crate) fn entry_name(index: u64, extension: &str) -> String {
    format!("{:0width$}.{}", index, extension, width = ENTRY_NAME_DIGITS)
}

/// Accumulates blobs as numbered archive entries.
///
/// Entry numbers increase monotonically and are never reused. When an
/// auto-save interval is set, the archive is saved to the sink and replaced
/// by an empty one each time the current part holds that many seconds of
/// frames.
pub struct ArchiveEncoder {
    settings: EncoderSettings,
    factory: ArchiveFactory,
    sink: Arc<dyn ArtifactSink>,
    bus: EventBus,
    entry_extension: &'static str,
    archive: Option<Box<dyn ArchiveWriter>>,
    /// Next entry number.
    count: u64,
    /// Frames in the current part.
    frames: u64,
    /// Frames across all parts.
    total_frames: u64,
    part: u32,
    parts_delivered: u32,
}

impl ArchiveEncoder {
    /// Create an archive encoder naming entries `NNNNNN.<entry_extension>`.
    pub fn new(
        settings: EncoderSettings,
        factory: ArchiveFactory,
        sink: Arc<dyn ArtifactSink>,
        entry_extension: &'static str,
        bus: EventBus,
    ) -> Self {
        Self {
            settings,
            factory,
            sink,
            bus,
            entry_extension,
            archive: None,
            count: 0,
            frames: 0,
            total_frames: 0,
            part: 1,
            parts_delivered: 0,
        }
    }

    /// Discard prior state and open an empty archive.
    pub fn start(&mut self) {
        self.dispose();
        self.archive = Some((self.factory)());
        debug!(extension = self.entry_extension, "Archive started");
    }

    /// Append one blob as the next numbered entry.
    ///
    /// IO failures drop the blob and are reported on the bus.
    pub fn add_blob(&mut self, blob: &[u8]) {
        let Some(archive) = self.archive.as_mut() else {
            self.bus.error(EncoderError::NotStarted.to_string());
            return;
        };

        let name = entry_name(self.count, self.entry_extension);
        if let Err(e) = archive.append(&name, blob) {
            self.bus
                .error(format!("Failed to append {name}: {}", EncoderError::Io(e)));
            return;
        }

        trace!(entry = %name, size = blob.len(), "Archived frame");
        self.count += 1;
        self.frames += 1;
        self.total_frames += 1;

        if self.should_rotate() {
            self.rotate();
        }

        self.bus.step();
    }

    /// Hand the serialized archive to `callback`.
    pub fn save(&mut self, callback: SaveCallback) {
        if self.archive.is_none() {
            self.bus.error(EncoderError::NoArchive.to_string());
            return;
        }

        if self.parts_delivered > 0 && self.frames == 0 {
            let reason = format!(
                "every frame was already delivered in {} auto-saved parts",
                self.parts_delivered
            );
            info!(parts = self.parts_delivered, "Final part empty, nothing to save");
            self.bus.emit(EncoderEvent::NothingToSave { reason });
            return;
        }

        match self.serialize() {
            Ok(artifact) => {
                info!(
                    name = %artifact.file_name(),
                    size = artifact.len(),
                    frames = self.frames,
                    "Archive saved"
                );
                callback(artifact);
            }
            Err(e) => self.bus.error(e.to_string()),
        }
    }

    /// Discard the archive and reset counters. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        self.archive = None;
        self.count = 0;
        self.frames = 0;
        self.total_frames = 0;
        self.part = 1;
        self.parts_delivered = 0;
    }

    /// Frames across all parts.
    pub fn frames(&self) -> u64 {
        self.total_frames
    }

    /// Frames in the current part.
    pub fn part_frames(&self) -> u64 {
        self.frames
    }

    /// Current part number, starting at 1.
    pub fn part(&self) -> u32 {
        self.part
    }

    /// Returns true once an archive is open.
    pub fn is_started(&self) -> bool {
        self.archive.is_some()
    }

    fn should_rotate(&self) -> bool {
        self.settings.auto_save_time > 0.0
            && self.frames as f64 / f64::from(self.settings.rate) >= self.settings.auto_save_time
    }

    #[instrument(name = "archive_rotate", skip(self), fields(part = self.part))]
    fn rotate(&mut self) {
        match self.serialize() {
            Ok(artifact) => {
                let artifact = artifact.with_part(self.part);
                info!(
                    name = %artifact.file_name(),
                    size = artifact.len(),
                    frames = self.frames,
                    "Auto-saving archive part"
                );
                self.sink.deliver(artifact);
                self.parts_delivered += 1;
            }
            Err(e) => {
                self.bus.error(format!("Auto-save failed: {e}"));
            }
        }

        self.archive = Some((self.factory)());
        self.part += 1;
        self.frames = 0;
    }

    fn serialize(&mut self) -> Result<Artifact, EncoderError> {
        let archive = self.archive.as_mut().ok_or(EncoderError::NoArchive)?;
        let data = archive.finish()?;

        let artifact = Artifact::new(data, self.settings.format, self.settings.name.clone());
        Ok(if self.parts_delivered > 0 {
            artifact.with_part(self.part)
        } else {
            artifact
        })
    }
}
