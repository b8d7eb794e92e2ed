//! Data types shared by the decode pipeline.
//!
//! Ownership of pixel memory is explicit throughout: a [`PixelBuffer`] is
//! either held by the pool, lent to exactly one decode attempt through
//! [`DecodeOptions::reused_buffer`], or owned by a [`DecodedImage`].

use serde::{Deserialize, Serialize};

use super::pool::PoolLease;

// =============================================================================
// Pixel Format
// =============================================================================

/// Memory layout of decoded pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    #[default]
    Rgba8,

    /// 8-bit RGB, 3 bytes per pixel
    Rgb8,

    /// 8-bit luminance + alpha, 2 bytes per pixel
    La8,

    /// 8-bit luminance, 1 byte per pixel
    L8,
}

impl PixelFormat {
    /// Bytes used by a single pixel.
    pub const fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::La8 => 2,
            PixelFormat::L8 => 1,
        }
    }

    /// Whether the format carries an alpha channel.
    pub const fn has_alpha(&self) -> bool {
        matches!(self, PixelFormat::Rgba8 | PixelFormat::La8)
    }

    /// Bytes needed for a `width` x `height` frame.
    pub fn byte_size(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    pub const fn name(&self) -> &'static str {
        match self {
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::La8 => "la8",
            PixelFormat::L8 => "l8",
        }
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgba8" | "rgba" => Ok(PixelFormat::Rgba8),
            "rgb8" | "rgb" => Ok(PixelFormat::Rgb8),
            "la8" | "la" => Ok(PixelFormat::La8),
            "l8" | "l" | "gray" => Ok(PixelFormat::L8),
            other => Err(format!("unknown pixel format: {}", other)),
        }
    }
}

// =============================================================================
// Pixel Buffer
// =============================================================================

/// An owned pixel allocation, optionally lent by a buffer pool.
///
/// The allocation size never changes after creation; a frame smaller than the
/// allocation occupies its prefix. A lent buffer goes back to its pool when
/// dropped.
#[derive(Debug)]
pub struct PixelBuffer {
    data: Vec<u8>,
    format: PixelFormat,
    lease: Option<PoolLease>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer that is not owned by any pool.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self::with_capacity(format.byte_size(width, height), format)
    }

    /// Allocate a zeroed buffer of `capacity` bytes.
    pub fn with_capacity(capacity: usize, format: PixelFormat) -> Self {
        Self {
            data: vec![0; capacity],
            format,
            lease: None,
        }
    }

    /// Wrap an existing allocation that is not owned by any pool.
    pub fn with_data(data: Vec<u8>, format: PixelFormat) -> Self {
        Self {
            data,
            format,
            lease: None,
        }
    }

    pub(crate) fn pooled(data: Vec<u8>, format: PixelFormat, lease: PoolLease) -> Self {
        Self {
            data,
            format,
            lease: Some(lease),
        }
    }

    /// Split into the allocation and its lease without returning anything
    /// to the pool.
    pub(crate) fn into_parts(mut self) -> (Vec<u8>, PixelFormat, Option<PoolLease>) {
        let lease = self.lease.take();
        (std::mem::take(&mut self.data), self.format, lease)
    }

    /// Allocated size in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pool slot this buffer belongs to, if any.
    pub fn slot(&self) -> Option<u64> {
        self.lease.as_ref().map(PoolLease::slot)
    }

    pub fn is_pooled(&self) -> bool {
        self.lease.is_some()
    }

    /// Whether a `width` x `height` frame in `format` fits this allocation.
    pub fn fits(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        self.format == format && format.byte_size(width, height) <= self.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            lease.give_back(std::mem::take(&mut self.data), self.format);
        }
    }
}

// =============================================================================
// Bounds Probe
// =============================================================================

/// Header-only metadata read before any pixels are decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundsProbe {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

impl BoundsProbe {
    pub fn new(width: u32, height: u32, mime_type: impl Into<String>) -> Self {
        Self {
            width,
            height,
            mime_type: mime_type.into(),
        }
    }
}

// =============================================================================
// Decode Options
// =============================================================================

/// Mutable state handed to the codec for one decode call.
#[derive(Debug)]
pub struct DecodeOptions {
    /// Downscale divisor, a power of two
    pub sample_size: u32,

    /// Buffer lent by the pool for this attempt only
    pub reused_buffer: Option<PixelBuffer>,

    /// Layout of the produced pixels
    pub output_format: PixelFormat,

    /// Probed bounds, copied in before decoding
    pub bounds: Option<BoundsProbe>,
}

impl DecodeOptions {
    pub fn new(output_format: PixelFormat) -> Self {
        Self {
            sample_size: 1,
            reused_buffer: None,
            output_format,
            bounds: None,
        }
    }

    /// Frame size the codec is expected to produce for the probed bounds.
    pub fn expected_dimensions(&self) -> Option<(u32, u32)> {
        self.bounds
            .as_ref()
            .map(|b| sampled_dimensions(b.width, b.height, self.sample_size))
    }
}

/// Dimensions of a `width` x `height` source decoded with `sample_size`.
///
/// Each axis is divided with truncation and never drops below one pixel.
pub fn sampled_dimensions(width: u32, height: u32, sample_size: u32) -> (u32, u32) {
    let sample_size = sample_size.max(1);
    ((width / sample_size).max(1), (height / sample_size).max(1))
}

// =============================================================================
// Decoded Image
// =============================================================================

/// Metadata attached to a successful decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttributes {
    pub mime_type: String,
    pub original_width: u32,
    pub original_height: u32,
    pub orientation_degrees: u32,
}

/// Decoded pixels together with the buffer that holds them.
#[derive(Debug)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    buffer: PixelBuffer,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, buffer: PixelBuffer) -> Self {
        Self {
            width,
            height,
            buffer,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.buffer.format()
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Bytes occupied by the frame itself.
    pub fn byte_len(&self) -> usize {
        self.format().byte_size(self.width, self.height)
    }

    /// The frame's pixels, excluding any unused tail of the allocation.
    pub fn pixels(&self) -> &[u8] {
        let len = self.byte_len().min(self.buffer.capacity());
        &self.buffer.as_slice()[..len]
    }

    /// Whether the buffer still holds the whole declared frame.
    pub fn is_intact(&self) -> bool {
        self.byte_len() <= self.buffer.capacity()
    }

    /// Give up the pixels and return the underlying allocation.
    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }
}
