//! Per-request configuration snapshot.
//!
//! A [`DecodeRequest`] is read-only for the pipeline: options are fixed when
//! the request is built and the only shared state is the cancellation flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::size::MaxSize;
use super::types::PixelFormat;

/// User options that shape a decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Bounding box for the decoded image; `None` decodes at full size
    pub max_size: Option<MaxSize>,

    /// Skip the decoded pixel ceiling
    pub large_image_allowed: bool,

    /// Let the decode borrow buffers from the pool
    pub buffer_pool_enabled: bool,

    /// Persist downsampled results in the processed cache
    pub cache_processed_image: bool,

    /// Layout of the decoded pixels
    pub output_format: PixelFormat,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_size: None,
            large_image_allowed: false,
            buffer_pool_enabled: true,
            cache_processed_image: false,
            output_format: PixelFormat::Rgba8,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, width: i32, height: i32) -> Self {
        self.max_size = Some(MaxSize::new(width, height));
        self
    }

    pub fn with_large_image_allowed(mut self, allowed: bool) -> Self {
        self.large_image_allowed = allowed;
        self
    }

    pub fn with_buffer_pool(mut self, enabled: bool) -> Self {
        self.buffer_pool_enabled = enabled;
        self
    }

    pub fn with_processed_cache(mut self, enabled: bool) -> Self {
        self.cache_processed_image = enabled;
        self
    }

    pub fn with_output_format(mut self, format: PixelFormat) -> Self {
        self.output_format = format;
        self
    }
}

/// Shared cancellation flag, checked at pipeline boundaries only.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single image load.
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    /// Identity of the image, used in logs and cache keys
    pub uri: String,

    pub options: RequestOptions,

    pub cancel: CancelSignal,
}

impl DecodeRequest {
    pub fn new(uri: impl Into<String>) -> Self {
        Self::with_options(uri, RequestOptions::default())
    }

    pub fn with_options(uri: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            uri: uri.into(),
            options,
            cancel: CancelSignal::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
