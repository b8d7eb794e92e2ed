use thiserror::Error;

/// Errors raised by a data source while supplying encoded bytes
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The image could not be located
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Reading the encoded bytes failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound(err.to_string()),
            _ => SourceError::Io(err.to_string()),
        }
    }
}

/// Errors that end a decode attempt.
///
/// Buffer mismatches are normally recovered inside the pipeline by a single
/// retry without reuse; `BufferMismatch` only escapes when the retry itself
/// reports a mismatch.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The data source could not supply bytes
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Reading the image header failed
    #[error("Bounds probe failed: {message}")]
    BoundsProbe { message: String },

    /// A lent pool buffer was incompatible with the decoded frame
    #[error("Reused buffer incompatible: {message}")]
    BufferMismatch { message: String },

    /// Any other decode failure, or a failure after the retry
    #[error("Decode failed: {message}")]
    Fatal { message: String },

    /// The decoder produced an unusable image
    #[error("Invalid decoded image: {width}x{height}")]
    Validation { width: u32, height: u32 },

    /// The request was cancelled at a pipeline boundary
    #[error("Decode cancelled")]
    Cancelled,
}

impl DecodeError {
    /// Short machine-readable name of the error kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            DecodeError::Source(_) => "source",
            DecodeError::BoundsProbe { .. } => "bounds_probe",
            DecodeError::BufferMismatch { .. } => "buffer_mismatch",
            DecodeError::Fatal { .. } => "fatal",
            DecodeError::Validation { .. } => "validation",
            DecodeError::Cancelled => "cancelled",
        }
    }
}

/// Errors from the processed-result cache
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Encoding the decoded pixels for storage failed
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// The pixel buffer does not describe a complete image
    #[error("Pixel buffer holds {actual} bytes, {expected} required")]
    BufferSize { expected: usize, actual: usize },
}

/// Errors returned by [`crate::service::DecodeService`]
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The blocking decode task did not complete
    #[error("Decode task failed: {0}")]
    Task(String),
}
