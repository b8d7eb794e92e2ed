//! Storage for processed results.
//!
//! A processed result is the encoded form of a downsampled decode together
//! with the attributes of the image it came from. Loading one back skips the
//! expensive full-size decode of the original.
//!
//! # Size-Based Eviction
//!
//! [`MemoryProcessedStore`] tracks the total encoded size of its entries and
//! evicts least-recently-used entries when the capacity is exceeded.

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use crate::decode::ImageAttributes;

use super::key::ProcessedCacheKey;

/// Default store capacity: 64MB
pub const DEFAULT_PROCESSED_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

// =============================================================================
// Processed Image
// =============================================================================

/// An encoded downsampled result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    /// Encoded bytes (PNG or JPEG)
    pub data: Bytes,

    /// Attributes of the original image
    pub attributes: ImageAttributes,

    /// Sample size the result was produced with
    pub sample_size: u32,
}

impl ProcessedImage {
    pub fn new(data: Bytes, attributes: ImageAttributes, sample_size: u32) -> Self {
        Self {
            data,
            attributes,
            sample_size,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Persistence collaborator for processed results.
#[async_trait]
pub trait ProcessedStore: Send + Sync {
    async fn get(&self, key: &ProcessedCacheKey) -> Option<ProcessedImage>;

    async fn put(&self, key: ProcessedCacheKey, image: ProcessedImage);

    async fn remove(&self, key: &ProcessedCacheKey) -> Option<ProcessedImage>;

    async fn clear(&self);

    /// Returns `(current_size, capacity, entry_count)`.
    async fn stats(&self) -> (usize, usize, usize);
}

// =============================================================================
// Memory Store
// =============================================================================

/// In-memory LRU store with a byte capacity.
pub struct MemoryProcessedStore {
    cache: RwLock<LruCache<ProcessedCacheKey, ProcessedImage>>,

    max_size: usize,

    current_size: RwLock<usize>,
}

impl MemoryProcessedStore {
    /// Create a store with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PROCESSED_CACHE_CAPACITY)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(LruCache::unbounded()),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    pub async fn contains(&self, key: &ProcessedCacheKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.read().await;
        cache.is_empty()
    }

    pub async fn size(&self) -> usize {
        let current_size = self.current_size.read().await;
        *current_size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryProcessedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessedStore for MemoryProcessedStore {
    async fn get(&self, key: &ProcessedCacheKey) -> Option<ProcessedImage> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Entries larger than the whole capacity are not stored.
    async fn put(&self, key: ProcessedCacheKey, image: ProcessedImage) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = cache.pop(&key) {
            *current_size = current_size.saturating_sub(old.len());
        }
        if image.len() > self.max_size {
            return;
        }

        *current_size += image.len();
        cache.put(key, image);

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => *current_size = current_size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    async fn remove(&self, key: &ProcessedCacheKey) -> Option<ProcessedImage> {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let removed = cache.pop(key)?;
        *current_size = current_size.saturating_sub(removed.len());
        Some(removed)
    }

    async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    async fn stats(&self) -> (usize, usize, usize) {
        (self.size().await, self.capacity(), self.len().await)
    }
}

// =============================================================================
// Tests
// =============================================================================
