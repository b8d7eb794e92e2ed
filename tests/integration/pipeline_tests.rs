//! Decode pipeline integration tests.
//!
//! Tests verify:
//! - Downsampled decodes of real encoded images
//! - Buffer pool reuse across decodes and threads
//! - Failure paths notify the source once and leak no buffers

use std::sync::Arc;

use bytes::Bytes;

use bitmap_decode::cache::ProcessedImageEncoder;
use bitmap_decode::decode::{
    BufferPool, DecodePipeline, DecodeRequest, DecodeStrategy, FileSource, ImageAttributes,
    PixelFormat, RequestOptions, SizeCalculator,
};
use bitmap_decode::{DecodeError, ProcessedSource};

use super::test_utils::{
    create_noisy_png, create_test_gif, create_test_jpeg, create_test_png, write_temp_file,
    RecordingMonitor, TrackingSource,
};

fn pipeline_with_monitor() -> (Arc<BufferPool>, Arc<RecordingMonitor>, DecodePipeline) {
    let pool = Arc::new(BufferPool::new());
    let monitor = RecordingMonitor::new();
    let pipeline = DecodePipeline::new(Arc::clone(&pool)).with_monitor(monitor.clone());
    (pool, monitor, pipeline)
}

// =============================================================================
// Successful Decodes
// =============================================================================

#[test]
fn test_downsampled_jpeg_decode() {
    let (pool, _, pipeline) = pipeline_with_monitor();
    let source = TrackingSource::new(create_test_jpeg(400, 300));
    let request = DecodeRequest::with_options(
        "photo.jpg",
        RequestOptions::new()
            .with_max_size(100, 75)
            .with_output_format(PixelFormat::Rgb8),
    );

    let result = pipeline.decode(&request, &source).unwrap();

    assert_eq!(result.sample_size, 4);
    assert_eq!((result.image.width(), result.image.height()), (100, 75));
    assert_eq!(result.image.format(), PixelFormat::Rgb8);
    assert_eq!(result.image.pixels().len(), 100 * 75 * 3);
    assert_eq!(result.attributes.mime_type, "image/jpeg");
    assert_eq!(
        source.successes(),
        vec![(400, 300, "image/jpeg".to_string(), 4)]
    );
    assert_eq!(source.notifications(), 1);

    pool.release(result.image.into_buffer());
    assert_eq!(pool.lent_count(), 0);
}

#[test]
fn test_pixel_ceiling_forces_extra_downsampling() {
    let pool = Arc::new(BufferPool::new());
    let pipeline = DecodePipeline::new(pool)
        .with_size_calculator(SizeCalculator::with_max_pixels(50 * 50));
    let png = create_test_png(400, 400);

    // The box alone would allow 200x200
    let request = DecodeRequest::with_options(
        "big.png",
        RequestOptions::new().with_max_size(200, 200),
    );
    let result = pipeline
        .decode(&request, &TrackingSource::new(png.clone()))
        .unwrap();
    assert_eq!(result.sample_size, 8);
    assert_eq!((result.image.width(), result.image.height()), (50, 50));

    let request = DecodeRequest::with_options(
        "big.png",
        RequestOptions::new()
            .with_max_size(200, 200)
            .with_large_image_allowed(true),
    );
    let result = pipeline.decode(&request, &TrackingSource::new(png)).unwrap();
    assert_eq!(result.sample_size, 2);
    assert_eq!((result.image.width(), result.image.height()), (200, 200));
}

#[test]
fn test_one_unconstrained_axis() {
    let pipeline = DecodePipeline::new(Arc::new(BufferPool::new()));
    let request = DecodeRequest::with_options(
        "wide.png",
        RequestOptions::new().with_max_size(0, 30),
    );

    let result = pipeline
        .decode(&request, &TrackingSource::new(create_test_png(256, 128)))
        .unwrap();

    assert_eq!(result.sample_size, 8);
    assert_eq!((result.image.width(), result.image.height()), (32, 16));
}

#[test]
fn test_released_buffer_is_reused() {
    let (pool, _, pipeline) = pipeline_with_monitor();
    let png = create_test_png(64, 64);
    let request = DecodeRequest::with_options(
        "a.png",
        RequestOptions::new().with_max_size(32, 32),
    );

    let first = pipeline
        .decode(&request, &TrackingSource::new(png.clone()))
        .unwrap();
    pool.release(first.image.into_buffer());

    let second = pipeline.decode(&request, &TrackingSource::new(png)).unwrap();
    assert!(second.image.buffer().is_pooled());

    let stats = pool.stats();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.hits, 1);
    pool.release(second.image.into_buffer());
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_dropped_results_keep_pool_reusable() {
    let pool = Arc::new(BufferPool::with_limits(1024 * 1024, 2));
    let pipeline = DecodePipeline::new(Arc::clone(&pool));
    let png = create_test_png(64, 64);
    let request = DecodeRequest::with_options(
        "a.png",
        RequestOptions::new().with_max_size(32, 32),
    );

    // Results discarded without an explicit release
    for _ in 0..2 {
        let result = pipeline
            .decode(&request, &TrackingSource::new(png.clone()))
            .unwrap();
        assert!(result.image.buffer().is_pooled());
    }
    assert_eq!(pool.lent_count(), 0);

    for _ in 0..3 {
        let result = pipeline
            .decode(&request, &TrackingSource::new(png.clone()))
            .unwrap();
        assert!(result.image.buffer().is_pooled());
        pool.release(result.image.into_buffer());
    }

    let stats = pool.stats();
    assert_eq!(stats.allocations, 1);
    assert_eq!(stats.hits, 4);
    assert_eq!(stats.unpooled, 0);
    assert!(pool.acquire(32, 32, PixelFormat::Rgba8).is_some());
}

#[test]
fn test_gif_decodes_without_pool() {
    let (pool, _, pipeline) = pipeline_with_monitor();
    let source = TrackingSource::new(create_test_gif(20, 10));

    let result = pipeline
        .decode(&DecodeRequest::new("anim.gif"), &source)
        .unwrap();

    assert_eq!(result.attributes.mime_type, "image/gif");
    assert!(!result.image.buffer().is_pooled());
    assert_eq!(pool.stats().allocations, 0);
}

#[test]
fn test_file_source_decode() {
    let path = write_temp_file("photo.jpg", &create_test_jpeg(120, 80));
    let pipeline = DecodePipeline::new(Arc::new(BufferPool::new()));

    let request = DecodeRequest::with_options(
        path.display().to_string(),
        RequestOptions::new().with_max_size(60, 60),
    );
    let result = pipeline.decode(&request, &FileSource::new(&path)).unwrap();

    assert_eq!(result.sample_size, 2);
    assert_eq!((result.image.width(), result.image.height()), (60, 40));
}

#[test]
fn test_processed_copy_restores_original_attributes() {
    let pipeline = DecodePipeline::new(Arc::new(BufferPool::new()));
    let request = DecodeRequest::with_options(
        "a.png",
        RequestOptions::new()
            .with_max_size(32, 32)
            .with_processed_cache(true),
    );

    let original = pipeline
        .decode(&request, &TrackingSource::new(create_test_png(128, 96)))
        .unwrap();
    assert!(original.is_processed());
    assert_eq!(original.strategy, DecodeStrategy::Normal);

    let encoded = ProcessedImageEncoder::new().encode(&original.image).unwrap();
    let copy = ProcessedSource::new(encoded, original.attributes.clone());
    let reloaded = pipeline.decode(&request, &copy).unwrap();

    assert_eq!(reloaded.strategy, DecodeStrategy::Processed);
    assert_eq!(reloaded.sample_size, 1);
    assert!(!reloaded.is_processed());
    assert_eq!(reloaded.attributes, original.attributes);
    assert_eq!(reloaded.image.pixels(), original.image.pixels());
}

// =============================================================================
// Failure Paths
// =============================================================================

#[test]
fn test_degenerate_image_is_rejected_without_leaks() {
    let (pool, monitor, pipeline) = pipeline_with_monitor();
    let source = TrackingSource::new(create_test_png(1, 50));

    let result = pipeline.decode(&DecodeRequest::new("line.png"), &source);

    assert!(matches!(
        result,
        Err(DecodeError::Validation {
            width: 1,
            height: 50
        })
    ));
    assert_eq!(source.error_count(), 1);
    assert!(source.successes().is_empty());
    assert_eq!(monitor.errors(), vec!["validation"]);
    assert_eq!(pool.lent_count(), 0);
    assert_eq!(pool.free_entries().len(), 1);
}

#[test]
fn test_truncated_image_is_fatal() {
    let (pool, monitor, pipeline) = pipeline_with_monitor();
    let mut png = create_noisy_png(128, 128);
    png.truncate(png.len() / 2);
    let source = TrackingSource::new(png);

    let result = pipeline.decode(&DecodeRequest::new("cut.png"), &source);

    assert!(matches!(result, Err(DecodeError::Fatal { .. })));
    assert_eq!(source.notifications(), 1);
    assert_eq!(monitor.errors(), vec!["fatal"]);
    assert_eq!(monitor.mismatches(), 0);
    assert_eq!(pool.lent_count(), 0);
}

#[test]
fn test_unrecognized_bytes_fail_probe() {
    let (pool, monitor, pipeline) = pipeline_with_monitor();
    let source = TrackingSource::new(b"definitely not an image".to_vec());

    let result = pipeline.decode(&DecodeRequest::new("junk.bin"), &source);

    assert!(matches!(result, Err(DecodeError::BoundsProbe { .. })));
    assert_eq!(source.error_count(), 1);
    assert_eq!(monitor.errors(), vec!["bounds_probe"]);
    assert!(pool.is_empty());
}

#[test]
fn test_missing_file() {
    let (_, monitor, pipeline) = pipeline_with_monitor();
    let source = FileSource::new("/no/such/dir/image.png");

    let result = pipeline.decode(&DecodeRequest::new("image.png"), &source);

    assert!(matches!(result, Err(DecodeError::Source(_))));
    assert_eq!(monitor.errors(), vec!["source"]);
}

#[test]
fn test_cancelled_request() {
    let (pool, monitor, pipeline) = pipeline_with_monitor();
    let source = TrackingSource::new(create_test_png(32, 32));
    let request = DecodeRequest::new("a.png");
    request.cancel.cancel();

    let result = pipeline.decode(&request, &source);

    assert!(matches!(result, Err(DecodeError::Cancelled)));
    assert_eq!(source.error_count(), 1);
    assert!(monitor.errors().is_empty());
    assert!(pool.is_empty());
}

#[test]
fn test_processed_copy_with_unreadable_bytes() {
    let pipeline = DecodePipeline::new(Arc::new(BufferPool::new()));
    let copy = ProcessedSource::new(
        Bytes::from_static(b"garbage"),
        ImageAttributes {
            mime_type: "image/png".to_string(),
            original_width: 100,
            original_height: 100,
            orientation_degrees: 0,
        },
    );

    let result = pipeline.decode(&DecodeRequest::new("a.png"), &copy);
    assert!(matches!(result, Err(DecodeError::BoundsProbe { .. })));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_decodes_share_pool() {
    let pool = Arc::new(BufferPool::with_limits(16 * 1024 * 1024, 8));
    let pipeline = DecodePipeline::new(Arc::clone(&pool));
    let images: Vec<Vec<u8>> = [(64, 64), (128, 64), (96, 96), (64, 128)]
        .iter()
        .map(|&(w, h)| create_test_png(w, h))
        .collect();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let pipeline = &pipeline;
            let pool = &pool;
            let images = &images;
            scope.spawn(move || {
                for round in 0..10 {
                    let data = images[(worker + round) % images.len()].clone();
                    let request = DecodeRequest::with_options(
                        format!("img-{}-{}", worker, round),
                        RequestOptions::new().with_max_size(32, 32),
                    );
                    let result = pipeline
                        .decode(&request, &TrackingSource::new(data))
                        .unwrap();
                    assert!(result.image.width() <= 32);
                    assert!(result.image.height() <= 32);
                    if result.image.buffer().is_pooled() {
                        pool.release(result.image.into_buffer());
                    }
                }
            });
        }
    });

    assert_eq!(pool.lent_count(), 0);
    assert!(pool.len() <= pool.max_entries());
    assert!(pool.size() <= pool.max_bytes());
}
