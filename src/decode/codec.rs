//! Codec seam between the pipeline and the actual image decoder.
//!
//! The pipeline never inspects decoder error text. A codec reports an
//! incompatible lent buffer by returning
//! [`DecodeOutcome::RetryableBufferMismatch`] and leaving the buffer attached
//! to the options, so the pipeline can reclaim it and retry without reuse.

use std::io::Cursor;

use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};

use crate::error::DecodeError;

use super::types::{
    sampled_dimensions, BoundsProbe, DecodeOptions, DecodedImage, PixelBuffer, PixelFormat,
};

/// MIME type reported when the container format is not recognized.
pub const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

// =============================================================================
// Decode Outcome
// =============================================================================

/// Result of a single codec decode call.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// Pixels decoded; a lent buffer, if any, now belongs to the image
    Success {
        image: DecodedImage,
        orientation_degrees: u32,
    },

    /// The lent buffer cannot hold the frame; it is still attached to the options
    RetryableBufferMismatch { reason: String },

    /// Decoding failed for any other reason
    Fatal { reason: String },
}

// =============================================================================
// ImageCodec Trait
// =============================================================================

/// A decoder for encoded image bytes.
///
/// Implementations must be callable from several worker threads at once.
pub trait ImageCodec: Send + Sync {
    /// Read the header only: dimensions and MIME type, no pixels.
    fn probe(&self, data: &[u8]) -> Result<BoundsProbe, DecodeError>;

    /// Decode pixels according to `options`.
    ///
    /// If `options.reused_buffer` is set and compatible, the codec takes it
    /// and writes the frame into it. Otherwise the buffer must be left in
    /// place.
    fn decode(&self, data: &[u8], options: &mut DecodeOptions) -> DecodeOutcome;

    /// Whether decodes of this MIME type may write into a lent buffer.
    fn supports_buffer_reuse(&self, _mime_type: &str) -> bool {
        true
    }
}

// =============================================================================
// image-crate Codec
// =============================================================================

/// Codec backed by the `image` crate.
///
/// Sample sizes greater than one downscale the decoded frame to
/// `source / sample_size` on each axis.
#[derive(Debug, Clone, Default)]
pub struct ImageCrateCodec {}

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self {}
    }
}

impl ImageCodec for ImageCrateCodec {
    fn probe(&self, data: &[u8]) -> Result<BoundsProbe, DecodeError> {
        let reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| DecodeError::BoundsProbe {
                message: e.to_string(),
            })?;

        let format = reader.format().ok_or_else(|| DecodeError::BoundsProbe {
            message: "unrecognized image format".to_string(),
        })?;

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| DecodeError::BoundsProbe {
                message: e.to_string(),
            })?;

        Ok(BoundsProbe::new(width, height, mime_type_for(format)))
    }

    fn decode(&self, data: &[u8], options: &mut DecodeOptions) -> DecodeOutcome {
        let reader = match ImageReader::new(Cursor::new(data)).with_guessed_format() {
            Ok(reader) if reader.format().is_some() => reader,
            Ok(_) => {
                return DecodeOutcome::Fatal {
                    reason: "unrecognized image format".to_string(),
                }
            }
            Err(e) => return DecodeOutcome::Fatal { reason: e.to_string() },
        };
        let mut decoder = match reader.into_decoder() {
            Ok(decoder) => decoder,
            Err(e) => return DecodeOutcome::Fatal { reason: e.to_string() },
        };
        let orientation_degrees =
            orientation_degrees(decoder.orientation().unwrap_or(Orientation::NoTransforms));
        let format = options.output_format;

        // Full-size frames already in the output layout go straight into the
        // lent buffer.
        if options.sample_size <= 1 && same_layout(decoder.color_type(), format) {
            if let Some(mut lent) = options.reused_buffer.take() {
                let (width, height) = decoder.dimensions();
                let len = decoder.total_bytes() as usize;
                if !lent.fits(width, height, format) || len > lent.capacity() {
                    let reason = mismatch_reason(width, height, format, &lent);
                    options.reused_buffer = Some(lent);
                    return DecodeOutcome::RetryableBufferMismatch { reason };
                }
                return match decoder.read_image(&mut lent.as_mut_slice()[..len]) {
                    Ok(()) => DecodeOutcome::Success {
                        image: DecodedImage::new(width, height, lent),
                        orientation_degrees,
                    },
                    Err(e) => {
                        options.reused_buffer = Some(lent);
                        DecodeOutcome::Fatal { reason: e.to_string() }
                    }
                };
            }
        }

        let mut image = match DynamicImage::from_decoder(decoder) {
            Ok(image) => image,
            Err(e) => return DecodeOutcome::Fatal { reason: e.to_string() },
        };

        if options.sample_size > 1 {
            let (width, height) =
                sampled_dimensions(image.width(), image.height(), options.sample_size);
            image = image.resize_exact(width, height, FilterType::Triangle);
        }

        let (width, height) = (image.width(), image.height());
        let raw = into_raw_pixels(image, format);

        let buffer = match options.reused_buffer.take() {
            Some(mut lent) => {
                if !lent.fits(width, height, format) {
                    let reason = mismatch_reason(width, height, format, &lent);
                    options.reused_buffer = Some(lent);
                    return DecodeOutcome::RetryableBufferMismatch { reason };
                }
                lent.as_mut_slice()[..raw.len()].copy_from_slice(&raw);
                lent
            }
            None => PixelBuffer::with_data(raw, format),
        };

        DecodeOutcome::Success {
            image: DecodedImage::new(width, height, buffer),
            orientation_degrees,
        }
    }

    fn supports_buffer_reuse(&self, mime_type: &str) -> bool {
        mime_type != "image/gif"
    }
}

fn mismatch_reason(width: u32, height: u32, format: PixelFormat, lent: &PixelBuffer) -> String {
    format!(
        "{}x{} {} frame needs {} bytes, lent buffer holds {} bytes of {}",
        width,
        height,
        format.name(),
        format.byte_size(width, height),
        lent.capacity(),
        lent.format().name()
    )
}

/// Whether decoder output can be written unchanged as `format`.
fn same_layout(color: ColorType, format: PixelFormat) -> bool {
    matches!(
        (color, format),
        (ColorType::Rgba8, PixelFormat::Rgba8)
            | (ColorType::Rgb8, PixelFormat::Rgb8)
            | (ColorType::La8, PixelFormat::La8)
            | (ColorType::L8, PixelFormat::L8)
    )
}

fn into_raw_pixels(image: DynamicImage, format: PixelFormat) -> Vec<u8> {
    match format {
        PixelFormat::Rgba8 => image.into_rgba8().into_raw(),
        PixelFormat::Rgb8 => image.into_rgb8().into_raw(),
        PixelFormat::La8 => image.into_luma_alpha8().into_raw(),
        PixelFormat::L8 => image.into_luma8().into_raw(),
    }
}

fn orientation_degrees(orientation: Orientation) -> u32 {
    match orientation {
        Orientation::Rotate90 | Orientation::Rotate90FlipH => 90,
        Orientation::Rotate180 => 180,
        Orientation::Rotate270 | Orientation::Rotate270FlipH => 270,
        _ => 0,
    }
}

/// MIME type for a detected container format.
pub fn mime_type_for(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => "image/gif",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        _ => UNKNOWN_MIME_TYPE,
    }
}

// =============================================================================
// Tests
// =============================================================================
