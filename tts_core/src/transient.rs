use std::fs;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::SynthesisError;

/// A per-request `tts-*.wav` file that exists only while this guard lives.
///
/// The engine writes to [`path`](Self::path); dropping the guard removes the
/// file whether synthesis succeeded, failed, or the worker unwound.
#[derive(Debug)]
pub struct TransientAudioFile {
    file: Option<NamedTempFile>,
}

impl TransientAudioFile {
    pub fn acquire_in(dir: &Path) -> Result<Self, SynthesisError> {
        let file = tempfile::Builder::new()
            .prefix("tts-")
            .suffix(".wav")
            .tempfile_in(dir)?;
        Ok(Self { file: Some(file) })
    }

    pub fn path(&self) -> &Path {
        match &self.file {
            Some(file) => file.path(),
            None => Path::new(""),
        }
    }

    /// Read back whatever the engine left at the path.
    pub fn read_all(&self) -> Result<Vec<u8>, SynthesisError> {
        match fs::read(self.path()) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SynthesisError::MissingOutput),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TransientAudioFile {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        let path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            // Engines that unlink and recreate the path leave nothing for close() to find.
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove transient audio file {}: {e}", path.display());
            }
        }
    }
}
