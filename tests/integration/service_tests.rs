//! Decode service integration tests.
//!
//! Tests verify:
//! - Processed results are stored and decoded back on later loads
//! - Cache keys separate requests with different options
//! - Concurrent loads share one pool without leaking buffers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use bitmap_decode::cache::{
    MemoryProcessedStore, ProcessedCacheKey, ProcessedImage, ProcessedStore,
};
use bitmap_decode::decode::{
    BufferPool, DataSource, DecodePipeline, DecodeRequest, DecodeStrategy, PixelFormat,
    RequestOptions,
};
use bitmap_decode::{DecodeError, DecodeService, LoadError};

use super::test_utils::{create_test_jpeg, create_test_png, TrackingSource};

/// Store wrapper counting writes.
struct CountingStore {
    inner: MemoryProcessedStore,
    puts: AtomicUsize,
}

impl CountingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryProcessedStore::new(),
            puts: AtomicUsize::new(0),
        })
    }

    fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessedStore for CountingStore {
    async fn get(&self, key: &ProcessedCacheKey) -> Option<ProcessedImage> {
        self.inner.get(key).await
    }

    async fn put(&self, key: ProcessedCacheKey, image: ProcessedImage) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, image).await;
    }

    async fn remove(&self, key: &ProcessedCacheKey) -> Option<ProcessedImage> {
        self.inner.remove(key).await
    }

    async fn clear(&self) {
        self.inner.clear().await;
    }

    async fn stats(&self) -> (usize, usize, usize) {
        self.inner.stats().await
    }
}

fn cached_options(width: i32, height: i32) -> RequestOptions {
    RequestOptions::new()
        .with_max_size(width, height)
        .with_processed_cache(true)
}

// =============================================================================
// Processed Cache
// =============================================================================

#[tokio::test]
async fn test_opaque_result_round_trips_through_store() {
    let pool = Arc::new(BufferPool::new());
    let service = DecodeService::new(DecodePipeline::new(Arc::clone(&pool)));
    let jpeg = TrackingSource::new(create_test_jpeg(400, 300));
    let source: Arc<dyn DataSource> = Arc::new(jpeg.clone());
    let options = cached_options(100, 100).with_output_format(PixelFormat::Rgb8);

    let first = service
        .load(
            DecodeRequest::with_options("photo.jpg", options.clone()),
            Arc::clone(&source),
        )
        .await
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.result.sample_size, 4);
    pool.release(first.result.image.into_buffer());

    let second = service
        .load(DecodeRequest::with_options("photo.jpg", options), source)
        .await
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.result.strategy, DecodeStrategy::Processed);
    assert_eq!(
        (second.result.image.width(), second.result.image.height()),
        (100, 75)
    );
    assert_eq!(second.result.attributes.original_width, 400);
    assert_eq!(second.result.attributes.mime_type, "image/jpeg");

    // The original source was only read once, but resolved for both loads
    assert_eq!(jpeg.open_count(), 1);
    assert_eq!(
        jpeg.successes(),
        vec![
            (400, 300, "image/jpeg".to_string(), 4),
            (400, 300, "image/jpeg".to_string(), 4)
        ]
    );
    assert_eq!(jpeg.notifications(), 2);
}

#[tokio::test]
async fn test_different_options_miss() {
    let service = DecodeService::new(DecodePipeline::new(Arc::new(BufferPool::new())));
    let source: Arc<dyn DataSource> = Arc::new(TrackingSource::new(create_test_png(256, 256)));

    let first = service
        .load(
            DecodeRequest::with_options("a.png", cached_options(64, 64)),
            Arc::clone(&source),
        )
        .await
        .unwrap();
    let second = service
        .load(
            DecodeRequest::with_options("a.png", cached_options(32, 32)),
            Arc::clone(&source),
        )
        .await
        .unwrap();
    let third = service
        .load(
            DecodeRequest::with_options("b.png", cached_options(64, 64)),
            source,
        )
        .await
        .unwrap();

    assert!(!first.cache_hit);
    assert!(!second.cache_hit);
    assert!(!third.cache_hit);
    assert_eq!(service.cache_stats().await.2, 3);
}

#[tokio::test]
async fn test_only_eligible_results_are_stored() {
    let store = CountingStore::new();
    let service =
        DecodeService::with_store(DecodePipeline::new(Arc::new(BufferPool::new())), store.clone());

    // Not downsampled
    service
        .load(
            DecodeRequest::with_options("small.png", cached_options(64, 64)),
            Arc::new(TrackingSource::new(create_test_png(32, 32))),
        )
        .await
        .unwrap();
    // Caching disabled
    service
        .load(
            DecodeRequest::with_options(
                "big.png",
                RequestOptions::new().with_max_size(16, 16),
            ),
            Arc::new(TrackingSource::new(create_test_png(64, 64))),
        )
        .await
        .unwrap();
    assert_eq!(store.puts(), 0);

    service
        .load(
            DecodeRequest::with_options("big.png", cached_options(16, 16)),
            Arc::new(TrackingSource::new(create_test_png(64, 64))),
        )
        .await
        .unwrap();
    assert_eq!(store.puts(), 1);

    // A hit is never stored again
    let hit = service
        .load(
            DecodeRequest::with_options("big.png", cached_options(16, 16)),
            Arc::new(TrackingSource::new(create_test_png(64, 64))),
        )
        .await
        .unwrap();
    assert!(hit.cache_hit);
    assert_eq!(store.puts(), 1);
}

#[tokio::test]
async fn test_failed_load_is_not_stored() {
    let store = CountingStore::new();
    let service =
        DecodeService::with_store(DecodePipeline::new(Arc::new(BufferPool::new())), store.clone());
    let source = TrackingSource::new(create_test_png(1, 64));

    let result = service
        .load(
            DecodeRequest::with_options("line.png", cached_options(1, 16)),
            Arc::new(source.clone()),
        )
        .await;

    assert!(matches!(
        result,
        Err(LoadError::Decode(DecodeError::Validation { .. }))
    ));
    assert_eq!(source.error_count(), 1);
    assert_eq!(store.puts(), 0);
    assert_eq!(service.pool().lent_count(), 0);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads() {
    let pool = Arc::new(BufferPool::new());
    let service = Arc::new(DecodeService::new(DecodePipeline::new(Arc::clone(&pool))));
    let png = create_test_png(128, 128);

    let mut handles = Vec::new();
    for i in 0..16 {
        let service = Arc::clone(&service);
        let data = png.clone();
        handles.push(tokio::spawn(async move {
            let request =
                DecodeRequest::with_options(format!("img-{}.png", i % 4), cached_options(32, 32));
            let response = service
                .load(request, Arc::new(TrackingSource::new(data)))
                .await
                .unwrap();
            assert_eq!(
                (response.result.image.width(), response.result.image.height()),
                (32, 32)
            );
            if response.result.image.buffer().is_pooled() {
                service.pool().release(response.result.image.into_buffer());
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(pool.lent_count(), 0);
    let (_, _, entries) = service.cache_stats().await;
    assert_eq!(entries, 4);
}
