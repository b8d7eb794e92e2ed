//! Decode layer.
//!
//! Turns encoded image bytes into pixel buffers while recycling memory
//! through a shared buffer pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             DecodePipeline              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │ SizeCalculator│ │ DecodeStrategy  │  │
//! │  │ (sample size) │ │ (processed /    │  │
//! │  │               │ │  normal)        │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └──────┬─────────────────────┬────────────┘
//!        │                     │
//!        ▼                     ▼
//! ┌──────────────┐     ┌─────────────────┐
//! │  BufferPool  │     │   ImageCodec    │
//! │ (lend/return)│     │ (image crate)   │
//! └──────────────┘     └─────────────────┘
//! ```
//!
//! # Components
//!
//! - [`DecodePipeline`]: one decode attempt per call, with a single retry when
//!   a lent buffer does not fit
//! - [`BufferPool`]: bounded pool of pixel buffers keyed by size class
//! - [`SizeCalculator`]: power-of-two sample size under a pixel ceiling
//! - [`DecodeStrategy`]: specialized decode paths, tried in priority order
//! - [`ImageCodec`]: codec seam, implemented on the `image` crate by
//!   [`ImageCrateCodec`]
//! - [`DataSource`]: supplies bytes and receives the outcome
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bitmap_decode::decode::{
//!     BufferPool, DecodePipeline, DecodeRequest, FileSource, RequestOptions,
//! };
//!
//! let pool = Arc::new(BufferPool::new());
//! let pipeline = DecodePipeline::new(Arc::clone(&pool));
//!
//! let request = DecodeRequest::with_options(
//!     "photos/cat.jpg",
//!     RequestOptions::new().with_max_size(400, 300),
//! );
//! let result = pipeline.decode(&request, &FileSource::new("photos/cat.jpg"))?;
//! println!("{}x{}", result.image.width(), result.image.height());
//!
//! pool.release(result.image.into_buffer());
//! # Ok::<(), bitmap_decode::DecodeError>(())
//! ```

mod codec;
mod monitor;
mod pipeline;
mod pool;
mod request;
mod size;
mod source;
mod strategy;
mod types;

pub use codec::{mime_type_for, DecodeOutcome, ImageCodec, ImageCrateCodec, UNKNOWN_MIME_TYPE};
pub use monitor::{DecodeMonitor, TracingMonitor};
pub use pipeline::{DecodePipeline, DecodeResult};
pub use pool::{
    BufferPool, PoolStats, SizeClass, DEFAULT_POOL_MAX_BYTES, DEFAULT_POOL_MAX_ENTRIES,
};
pub use request::{CancelSignal, DecodeRequest, RequestOptions};
pub use size::{MaxSize, SizeCalculator, DEFAULT_MAX_DECODED_PIXELS};
pub use source::{DataSource, FileSource, MemorySource};
pub use strategy::DecodeStrategy;
pub use types::{
    sampled_dimensions, BoundsProbe, DecodeOptions, DecodedImage, ImageAttributes, PixelBuffer,
    PixelFormat,
};
