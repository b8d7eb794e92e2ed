//! Eligibility of decode results for the processed cache.
//!
//! Only decodes that actually downsampled are worth persisting: a sample size
//! of one would store a copy no cheaper to produce than decoding the source.

use crate::decode::RequestOptions;

/// Eligibility decision for one decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEligibility {
    pub sample_size: u32,
    pub allowed_by_policy: bool,
}

/// Processed cache policy for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessedImagePolicy {
    enabled: bool,
}

impl ProcessedImagePolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn for_options(options: &RequestOptions) -> Self {
        Self::new(options.cache_processed_image)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a decode with `sample_size` should be persisted.
    pub fn is_cache_eligible(&self, sample_size: u32) -> bool {
        self.enabled && sample_size > 1
    }

    pub fn eligibility(&self, sample_size: u32) -> CacheEligibility {
        CacheEligibility {
            sample_size,
            allowed_by_policy: self.is_cache_eligible(sample_size),
        }
    }
}
