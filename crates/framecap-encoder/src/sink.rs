//! Delivery of finished artifacts.

use parking_lot::Mutex;
use tracing::warn;

use crate::Artifact;

/// Receives artifacts produced outside an explicit `save` call, such as
/// auto-saved archive parts and saves triggered by capture limits.
pub trait ArtifactSink: Send + Sync {
    /// Take ownership of a finished artifact.
    fn deliver(&self, artifact: Artifact);
}

impl<F> ArtifactSink for F
where
    F: Fn(Artifact) + Send + Sync,
{
    fn deliver(&self, artifact: Artifact) {
        self(artifact)
    }
}

/// Sink that drops every artifact with a warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ArtifactSink for NullSink {
    fn deliver(&self, artifact: Artifact) {
        warn!(
            name = %artifact.file_name(),
            size = artifact.len(),
            "No artifact sink configured, discarding artifact"
        );
    }
}

/// Sink that keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    artifacts: Mutex<Vec<Artifact>>,
}

impl CollectingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts received so far.
    pub fn len(&self) -> usize {
        self.artifacts.lock().len()
    }

    /// Returns true if nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.artifacts.lock().is_empty()
    }

    /// Remove and return every collected artifact.
    pub fn take(&self) -> Vec<Artifact> {
        std::mem::take(&mut *self.artifacts.lock())
    }

    /// File names of the collected artifacts, in delivery order.
    pub fn names(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .iter()
            .map(Artifact::file_name)
            .collect()
    }
}

impl ArtifactSink for CollectingSink {
    fn deliver(&self, artifact: Artifact) {
        self.artifacts.lock().push(artifact);
    }
}
