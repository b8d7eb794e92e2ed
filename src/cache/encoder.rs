//! Encoder for processed results.
//!
//! Frames with an alpha channel are stored as PNG so transparency survives the
//! round trip; opaque frames are stored as JPEG at a configurable quality.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::decode::{DecodedImage, PixelFormat};
use crate::error::CacheError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Processed Image Encoder
// =============================================================================

/// Encodes decoded frames for the processed store.
#[derive(Debug, Clone, Copy)]
pub struct ProcessedImageEncoder {
    quality: u8,
}

impl ProcessedImageEncoder {
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_JPEG_QUALITY)
    }

    /// Create an encoder writing JPEG at `quality`, clamped to 1-100.
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode the frame held by `image`.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is shorter than the frame or the
    /// encoder fails.
    pub fn encode(&self, image: &DecodedImage) -> Result<Bytes, CacheError> {
        let expected = image.byte_len();
        let pixels = image.pixels();
        if pixels.len() < expected {
            return Err(CacheError::BufferSize {
                expected,
                actual: pixels.len(),
            });
        }

        let (width, height) = (image.width(), image.height());
        let color = ExtendedColorType::from(image.format());
        let mut output = Vec::new();

        let result = if image.format().has_alpha() {
            PngEncoder::new(&mut output).write_image(pixels, width, height, color)
        } else {
            JpegEncoder::new_with_quality(&mut output, self.quality)
                .write_image(pixels, width, height, color)
        };
        result.map_err(|e| CacheError::Encode {
            message: e.to_string(),
        })?;

        Ok(Bytes::from(output))
    }
}

impl Default for ProcessedImageEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl From<PixelFormat> for ExtendedColorType {
    fn from(format: PixelFormat) -> Self {
        match format {
            PixelFormat::Rgba8 => ExtendedColorType::Rgba8,
            PixelFormat::Rgb8 => ExtendedColorType::Rgb8,
            PixelFormat::La8 => ExtendedColorType::La8,
            PixelFormat::L8 => ExtendedColorType::L8,
        }
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
