//! Decode service for orchestrating image loads.
//!
//! The DecodeService is the main entry point for loads. It orchestrates:
//! - Processed cache lookups
//! - Decoding on the blocking worker pool
//! - Encoding and storing eligible results
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DecodeService                         │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                       load()                           │  │
//! │  │  1. Check processed store   3. Encode if eligible      │  │
//! │  │  2. Decode (spawn_blocking) 4. Store & return          │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │          │                    │                    │         │
//! │          ▼                    ▼                    ▼         │
//! │  ┌───────────────┐   ┌────────────────┐   ┌───────────────┐  │
//! │  │ProcessedStore │   │ DecodePipeline │   │ Processed     │  │
//! │  │               │   │ + BufferPool   │   │ ImageEncoder  │  │
//! │  └───────────────┘   └────────────────┘   └───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{
    MemoryProcessedStore, ProcessedCacheKey, ProcessedImage, ProcessedImageEncoder,
    ProcessedStore,
};
use crate::decode::{
    BufferPool, DataSource, DecodePipeline, DecodeRequest, DecodeResult, ImageAttributes,
    PoolStats,
};
use crate::error::{DecodeError, LoadError, SourceError};

// =============================================================================
// Processed Source
// =============================================================================

/// Data source over an entry read back from the processed store.
#[derive(Debug, Clone)]
pub struct ProcessedSource {
    data: Bytes,
    attributes: ImageAttributes,
}

impl ProcessedSource {
    pub fn new(data: Bytes, attributes: ImageAttributes) -> Self {
        Self { data, attributes }
    }
}

impl From<ProcessedImage> for ProcessedSource {
    fn from(image: ProcessedImage) -> Self {
        Self::new(image.data, image.attributes)
    }
}

impl DataSource for ProcessedSource {
    fn open_for_decode(&self) -> Result<Bytes, SourceError> {
        Ok(self.data.clone())
    }

    fn processed_attributes(&self) -> Option<&ImageAttributes> {
        Some(&self.attributes)
    }
}

// =============================================================================
// Load Response
// =============================================================================

/// Response from a load.
#[derive(Debug)]
pub struct LoadResponse {
    pub result: DecodeResult,

    /// Whether the image was decoded from the processed store
    pub cache_hit: bool,
}

// =============================================================================
// Decode Service
// =============================================================================

/// Service for loading images through the pipeline and the processed store.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use bitmap_decode::decode::{BufferPool, DecodePipeline, DecodeRequest, FileSource, RequestOptions};
/// use bitmap_decode::DecodeService;
///
/// # async fn example() -> Result<(), bitmap_decode::LoadError> {
/// let pool = Arc::new(BufferPool::new());
/// let service = DecodeService::new(DecodePipeline::new(Arc::clone(&pool)));
///
/// let request = DecodeRequest::with_options(
///     "photos/cat.jpg",
///     RequestOptions::new().with_max_size(400, 300).with_processed_cache(true),
/// );
/// let response = service
///     .load(request, Arc::new(FileSource::new("photos/cat.jpg")))
///     .await?;
///
/// println!("cache hit: {}", response.cache_hit);
/// pool.release(response.result.image.into_buffer());
/// # Ok(())
/// # }
/// ```
pub struct DecodeService {
    pipeline: Arc<DecodePipeline>,

    store: Arc<dyn ProcessedStore>,

    encoder: ProcessedImageEncoder,
}

impl DecodeService {
    /// Create a service with an in-memory processed store of default capacity.
    pub fn new(pipeline: DecodePipeline) -> Self {
        Self::with_store(pipeline, Arc::new(MemoryProcessedStore::new()))
    }

    pub fn with_store(pipeline: DecodePipeline, store: Arc<dyn ProcessedStore>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            store,
            encoder: ProcessedImageEncoder::new(),
        }
    }

    pub fn with_encoder(mut self, encoder: ProcessedImageEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Load an image, using the processed store when the request allows it.
    ///
    /// `source` receives exactly one outcome callback, including when the
    /// load is served from the processed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the decode fails or the blocking task is lost.
    /// Failing to store a processed result is logged and does not fail the
    /// load.
    pub async fn load(
        &self,
        request: DecodeRequest,
        source: Arc<dyn DataSource>,
    ) -> Result<LoadResponse, LoadError> {
        let key = request
            .options
            .cache_processed_image
            .then(|| ProcessedCacheKey::for_request(&request));

        if let Some(key) = &key {
            if let Some(entry) = self.store.get(key).await {
                let sample_size = entry.sample_size;
                let processed: Arc<dyn DataSource> = Arc::new(ProcessedSource::from(entry));

                // The pipeline resolves the processed copy; the caller's
                // source is resolved here, exactly once.
                match self.decode_blocking(request.clone(), processed).await {
                    Ok((mut result, _)) => {
                        debug!(uri = %request.uri, "Processed cache hit");
                        result.sample_size = sample_size;
                        let attrs = &result.attributes;
                        source.on_decode_success(
                            attrs.original_width,
                            attrs.original_height,
                            &attrs.mime_type,
                            sample_size,
                        );
                        return Ok(LoadResponse {
                            result,
                            cache_hit: true,
                        });
                    }
                    Err(LoadError::Decode(DecodeError::Cancelled)) => {
                        source.on_decode_error();
                        return Err(DecodeError::Cancelled.into());
                    }
                    Err(e) => {
                        warn!(
                            uri = %request.uri,
                            digest = %key.digest(),
                            "Dropping unreadable processed entry: {}",
                            e
                        );
                        self.store.remove(key).await;
                    }
                }
            }
        }

        let (result, encoded) = self.decode_blocking(request.clone(), source).await?;

        if let (Some(key), Some(data)) = (key, encoded) {
            debug!(
                uri = %request.uri,
                digest = %key.digest(),
                bytes = data.len(),
                sample_size = result.sample_size,
                "Storing processed result"
            );
            let entry = ProcessedImage::new(data, result.attributes.clone(), result.sample_size);
            self.store.put(key, entry).await;
        }

        Ok(LoadResponse {
            result,
            cache_hit: false,
        })
    }

    /// Decode on the blocking pool, encoding the result when it is eligible
    /// for the processed store.
    async fn decode_blocking(
        &self,
        request: DecodeRequest,
        source: Arc<dyn DataSource>,
    ) -> Result<(DecodeResult, Option<Bytes>), LoadError> {
        let pipeline = Arc::clone(&self.pipeline);
        let encoder = self.encoder;

        let task = tokio::task::spawn_blocking(move || {
            let result = pipeline.decode(&request, source.as_ref())?;
            let encoded = if result.is_processed() {
                encoder
                    .encode(&result.image)
                    .map_err(|e| {
                        warn!(uri = %request.uri, "Failed to encode processed result: {}", e)
                    })
                    .ok()
            } else {
                None
            };
            Ok::<_, DecodeError>((result, encoded))
        });

        let outcome = task.await.map_err(|e| LoadError::Task(e.to_string()))?;
        Ok(outcome?)
    }

    /// Get processed store statistics.
    ///
    /// Returns `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        self.store.stats().await
    }

    pub async fn clear_cache(&self) {
        self.store.clear().await;
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pipeline.pool().stats()
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        self.pipeline.pool()
    }

    pub fn pipeline(&self) -> &Arc<DecodePipeline> {
        &self.pipeline
    }
}

// =============================================================================
// Tests
// =============================================================================
