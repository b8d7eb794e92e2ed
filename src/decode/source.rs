//! Data sources supply encoded bytes and receive the decode outcome.
//!
//! The pipeline calls exactly one of [`DataSource::on_decode_success`] or
//! [`DataSource::on_decode_error`] for every decode attempt, so whatever
//! upstream state the source tracks is always resolved.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use crate::error::{DecodeError, SourceError};

use super::codec::ImageCodec;
use super::types::{BoundsProbe, ImageAttributes};

/// Supplier of encoded image bytes.
pub trait DataSource: Send + Sync {
    /// Read the complete encoded image.
    fn open_for_decode(&self) -> Result<Bytes, SourceError>;

    /// Read header metadata from the bytes returned by
    /// [`open_for_decode`](DataSource::open_for_decode) without decoding
    /// pixels.
    fn probe_bounds(
        &self,
        codec: &dyn ImageCodec,
        data: &[u8],
    ) -> Result<BoundsProbe, DecodeError> {
        codec.probe(data)
    }

    /// Attributes of the original image when these bytes are an already
    /// downsampled copy read back from the processed cache.
    fn processed_attributes(&self) -> Option<&ImageAttributes> {
        None
    }

    /// Called once after a decode was accepted.
    ///
    /// `width` and `height` are the original (probed) dimensions.
    fn on_decode_success(&self, _width: u32, _height: u32, _mime_type: &str, _sample_size: u32) {}

    /// Called once after a decode failed, was rejected or was cancelled.
    fn on_decode_error(&self) {}
}

// =============================================================================
// In-memory Source
// =============================================================================

/// Encoded bytes already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl DataSource for MemorySource {
    fn open_for_decode(&self) -> Result<Bytes, SourceError> {
        Ok(self.data.clone())
    }
}

// =============================================================================
// File Source
// =============================================================================

/// Encoded image stored in a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn open_for_decode(&self) -> Result<Bytes, SourceError> {
        let data = std::fs::read(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(self.path.display().to_string()),
            _ => SourceError::from(e),
        })?;
        Ok(Bytes::from(data))
    }

    fn on_decode_success(&self, width: u32, height: u32, mime_type: &str, sample_size: u32) {
        debug!(
            path = %self.path.display(),
            width = width,
            height = height,
            mime_type = mime_type,
            sample_size = sample_size,
            "Decoded file"
        );
    }

    fn on_decode_error(&self) {
        debug!(path = %self.path.display(), "Failed to decode file");
    }
}
