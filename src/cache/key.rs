//! Processed cache keys.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::decode::{DecodeRequest, PixelFormat};

/// Identity of a processed result.
///
/// Two requests map to the same entry only when every option that changes
/// the decoded pixels matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessedCacheKey {
    /// Request URI
    pub uri: Arc<str>,

    /// Requested bounding box, `(0, 0)` when unbounded
    pub max_width: i32,
    pub max_height: i32,

    pub large_image_allowed: bool,

    pub format: PixelFormat,
}

impl ProcessedCacheKey {
    pub fn new(
        uri: impl Into<Arc<str>>,
        max_width: i32,
        max_height: i32,
        large_image_allowed: bool,
        format: PixelFormat,
    ) -> Self {
        Self {
            uri: uri.into(),
            max_width,
            max_height,
            large_image_allowed,
            format,
        }
    }

    pub fn for_request(request: &DecodeRequest) -> Self {
        let options = &request.options;
        let (max_width, max_height) = options
            .max_size
            .map(|size| (size.width, size.height))
            .unwrap_or((0, 0));
        Self::new(
            request.uri.as_str(),
            max_width,
            max_height,
            options.large_image_allowed,
            options.output_format,
        )
    }

    /// Hex SHA-256 of the key, usable as a file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.uri.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.max_width.to_be_bytes());
        hasher.update(self.max_height.to_be_bytes());
        hasher.update([u8::from(self.large_image_allowed)]);
        hasher.update(self.format.name().as_bytes());
        hex::encode(hasher.finalize())
    }
}
