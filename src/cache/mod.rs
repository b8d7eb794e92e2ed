//! Processed-result cache.
//!
//! Downsampled decodes can be persisted so the next load of the same image
//! with the same options skips the full-size decode.
//!
//! # Components
//!
//! - [`ProcessedImagePolicy`]: decides whether a decode is worth storing
//! - [`ProcessedCacheKey`]: identity of a stored result, with a SHA-256 digest
//! - [`ProcessedStore`]: persistence seam; [`MemoryProcessedStore`] is an LRU
//!   with a byte capacity
//! - [`ProcessedImageEncoder`]: encodes frames for storage (PNG or JPEG)

mod encoder;
mod key;
mod policy;
mod store;

pub use encoder::{
    clamp_quality, is_valid_quality, ProcessedImageEncoder, DEFAULT_JPEG_QUALITY,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use key::ProcessedCacheKey;
pub use policy::{CacheEligibility, ProcessedImagePolicy};
pub use store::{
    MemoryProcessedStore, ProcessedImage, ProcessedStore, DEFAULT_PROCESSED_CACHE_CAPACITY,
};
