//! Sample size selection.
//!
//! The sample size is the power-of-two divisor applied while decoding so the
//! produced frame is no larger than the requested bounding box. Sources that
//! would still exceed the pixel ceiling are reduced further unless the request
//! explicitly allows large images.

use serde::{Deserialize, Serialize};

/// Default ceiling on decoded pixels (a 4096 x 4096 texture).
pub const DEFAULT_MAX_DECODED_PIXELS: u64 = 4096 * 4096;

/// Largest sample size the calculator will return.
const MAX_SAMPLE_SIZE: u64 = 1 << 30;

/// Requested bounding box for the decoded image.
///
/// A dimension of zero or less leaves that axis unconstrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaxSize {
    pub width: i32,
    pub height: i32,
}

impl MaxSize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Whether neither axis imposes a limit.
    pub const fn is_unbounded(&self) -> bool {
        self.width <= 0 && self.height <= 0
    }
}

/// Picks the downscale factor for a decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeCalculator {
    max_pixels: u64,
}

impl SizeCalculator {
    pub fn new() -> Self {
        Self::with_max_pixels(DEFAULT_MAX_DECODED_PIXELS)
    }

    /// Create a calculator with a custom decoded pixel ceiling.
    pub fn with_max_pixels(max_pixels: u64) -> Self {
        Self {
            max_pixels: max_pixels.max(1),
        }
    }

    /// Sample size for an optional bounding box; no box means no downsampling.
    pub fn sample_size_for(
        &self,
        source_width: u32,
        source_height: u32,
        max_size: Option<MaxSize>,
        allow_large: bool,
    ) -> u32 {
        match max_size {
            Some(max) => self.compute_sample_size(
                source_width,
                source_height,
                max.width,
                max.height,
                allow_large,
            ),
            None => 1,
        }
    }

    /// Smallest power of two `k` with `source / k` inside the target box.
    ///
    /// When `allow_large` is false, `k` keeps doubling until the decoded area
    /// `(source_width / k) * (source_height / k)` is within the pixel ceiling.
    pub fn compute_sample_size(
        &self,
        source_width: u32,
        source_height: u32,
        target_width: i32,
        target_height: i32,
        allow_large: bool,
    ) -> u32 {
        let source_width = source_width as u64;
        let source_height = source_height as u64;
        let mut sample_size: u64 = 1;

        let exceeds_target = |k: u64| {
            let over_width = target_width > 0 && source_width / k > target_width as u64;
            let over_height = target_height > 0 && source_height / k > target_height as u64;
            over_width || over_height
        };
        while sample_size < MAX_SAMPLE_SIZE && exceeds_target(sample_size) {
            sample_size *= 2;
        }

        if !allow_large {
            while sample_size < MAX_SAMPLE_SIZE
                && (source_width / sample_size) * (source_height / sample_size) > self.max_pixels
            {
                sample_size *= 2;
            }
        }

        sample_size as u32
    }
}

impl Default for SizeCalculator {
    fn default() -> Self {
        Self::new()
    }
}
