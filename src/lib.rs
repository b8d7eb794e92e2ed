//! # bitmap-decode
//!
//! A decode-and-reuse engine for image loading.
//!
//! Encoded images are decoded at the smallest power-of-two downscale that
//! still covers the requested size, into pixel buffers recycled through a
//! bounded pool. Downsampled results can be persisted so later loads skip the
//! full-size decode.
//!
//! ## Features
//!
//! - **Sample-size selection**: power-of-two downscale with a decoded pixel ceiling
//! - **Buffer pooling**: size-classed pixel buffers with explicit lend/return ownership
//! - **One-shot recovery**: a decode that rejects a lent buffer is retried once without reuse
//! - **Processed cache**: downsampled results stored as PNG or JPEG and decoded back
//!   with their original attributes
//!
//! ## Architecture
//!
//! - [`decode`] - pipeline, buffer pool, size calculation, codec and strategy dispatch
//! - [`cache`] - processed-result policy, keys, storage and encoding
//! - [`service`] - async orchestration of loads on the blocking worker pool
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bitmap_decode::{BufferPool, DecodePipeline, DecodeRequest, DecodeService, FileSource, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool = Arc::new(BufferPool::new());
//!     let service = DecodeService::new(DecodePipeline::new(Arc::clone(&pool)));
//!
//!     let request = DecodeRequest::with_options(
//!         "photos/cat.jpg",
//!         RequestOptions::new().with_max_size(400, 300),
//!     );
//!     if let Ok(response) = service
//!         .load(request, Arc::new(FileSource::new("photos/cat.jpg")))
//!         .await
//!     {
//!         pool.release(response.result.image.into_buffer());
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod service;

// Re-export commonly used types
pub use cache::{
    MemoryProcessedStore, ProcessedCacheKey, ProcessedImage, ProcessedImageEncoder,
    ProcessedImagePolicy, ProcessedStore,
};
pub use config::{Cli, Command, DecodeConfig, ProbeConfig};
pub use decode::{
    BoundsProbe, BufferPool, CancelSignal, DataSource, DecodeMonitor, DecodePipeline,
    DecodeRequest, DecodeResult, DecodeStrategy, DecodedImage, FileSource, ImageAttributes,
    ImageCodec, ImageCrateCodec, MaxSize, MemorySource, PixelBuffer, PixelFormat, PoolStats,
    RequestOptions, SizeCalculator,
};
pub use error::{CacheError, DecodeError, LoadError, SourceError};
pub use service::{DecodeService, LoadResponse, ProcessedSource};
