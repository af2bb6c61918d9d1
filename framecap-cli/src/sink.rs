//! Artifact sink writing files into a directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{error, info};

use framecap_encoder::{Artifact, ArtifactSink};

/// Writes every delivered artifact to `<dir>/<file name>`.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Mutex<Vec<PathBuf>>,
}

impl DirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            written: Mutex::new(Vec::new()),
        })
    }

    /// Paths written so far, in delivery order.
    pub fn written(&self) -> Vec<PathBuf> {
        self.written.lock().clone()
    }
}

impl ArtifactSink for DirectorySink {
    fn deliver(&self, artifact: Artifact) {
        let path = self.dir.join(artifact.file_name());
        match fs::write(&path, &artifact.data) {
            Ok(()) => {
                info!(path = %path.display(), size = artifact.len(), "Wrote artifact");
                self.written.lock().push(path);
            }
            Err(e) => error!(path = %path.display(), "Failed to write artifact: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecap_ipc::CaptureFormat;

    #[test]
    fn test_writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().join("nested")).unwrap();

        let artifact = Artifact::new(vec![1u8, 2, 3].into(), CaptureFormat::Gif, "clip").with_part(2);
        sink.deliver(artifact);

        let expected = dir.path().join("nested").join("clip-part-02.gif");
        assert_eq!(sink.written(), vec![expected.clone()]);
        assert_eq!(fs::read(expected).unwrap(), vec![1, 2, 3]);
    }
}
