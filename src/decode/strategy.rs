//! Decode strategy selection.
//!
//! Strategies are tried in [`DecodeStrategy::PRIORITY`] order and the first
//! match wins. [`DecodeStrategy::Normal`] matches everything and is always
//! last.

use crate::cache::{CacheEligibility, ProcessedImagePolicy};

use super::request::RequestOptions;
use super::size::SizeCalculator;
use super::source::DataSource;
use super::types::{BoundsProbe, ImageAttributes};

/// How a particular source is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Bytes read back from the processed cache: already downsampled
    Processed,

    /// Any other encoded image
    Normal,
}

impl DecodeStrategy {
    /// Evaluation order, specialized strategies first.
    pub const PRIORITY: [DecodeStrategy; 2] = [DecodeStrategy::Processed, DecodeStrategy::Normal];

    /// Pick the first strategy matching this source.
    pub fn select(source: &dyn DataSource, probe: &BoundsProbe) -> DecodeStrategy {
        Self::PRIORITY
            .into_iter()
            .find(|strategy| strategy.matches(source, probe))
            .unwrap_or(DecodeStrategy::Normal)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            DecodeStrategy::Processed => "processed",
            DecodeStrategy::Normal => "normal",
        }
    }

    pub fn matches(&self, source: &dyn DataSource, _probe: &BoundsProbe) -> bool {
        match self {
            DecodeStrategy::Processed => source.processed_attributes().is_some(),
            DecodeStrategy::Normal => true,
        }
    }

    /// Sample size to decode with.
    pub fn sample_size(
        &self,
        calculator: &SizeCalculator,
        options: &RequestOptions,
        probe: &BoundsProbe,
    ) -> u32 {
        match self {
            DecodeStrategy::Processed => 1,
            DecodeStrategy::Normal => calculator.sample_size_for(
                probe.width,
                probe.height,
                options.max_size,
                options.large_image_allowed,
            ),
        }
    }

    /// Attributes describing the original image.
    pub fn attributes(
        &self,
        source: &dyn DataSource,
        probe: &BoundsProbe,
        orientation_degrees: u32,
    ) -> ImageAttributes {
        match (self, source.processed_attributes()) {
            (DecodeStrategy::Processed, Some(original)) => original.clone(),
            _ => ImageAttributes {
                mime_type: probe.mime_type.clone(),
                original_width: probe.width,
                original_height: probe.height,
                orientation_degrees,
            },
        }
    }

    /// Whether the result should be persisted in the processed cache.
    ///
    /// Results read back from the processed cache are never stored again.
    pub fn cache_eligibility(
        &self,
        policy: &ProcessedImagePolicy,
        sample_size: u32,
    ) -> CacheEligibility {
        match self {
            DecodeStrategy::Processed => CacheEligibility {
                sample_size,
                allowed_by_policy: false,
            },
            DecodeStrategy::Normal => policy.eligibility(sample_size),
        }
    }
}
