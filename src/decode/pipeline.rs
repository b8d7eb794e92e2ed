//! Decode pipeline.
//!
//! ```text
//! open ─► probe bounds ─► select strategy ─► sample size
//!                                               │
//!            ┌──────────────────────────────────┘
//!            ▼
//!   [cancel?] ─► lend pool buffer ─► codec decode ──► [cancel?] ─► validate
//!                        ▲                │
//!                        │     buffer mismatch: reclaim buffer,
//!                        └──── report, retry once without reuse
//! ```
//!
//! Every exit path notifies the data source exactly once, and every pool
//! buffer touched by the attempt is either handed to the caller inside the
//! result or returned to the pool before the pipeline returns.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{CacheEligibility, ProcessedImagePolicy};
use crate::error::DecodeError;

use super::codec::{DecodeOutcome, ImageCodec, ImageCrateCodec};
use super::monitor::{DecodeMonitor, TracingMonitor};
use super::pool::BufferPool;
use super::request::DecodeRequest;
use super::size::SizeCalculator;
use super::source::DataSource;
use super::strategy::DecodeStrategy;
use super::types::{BoundsProbe, DecodeOptions, DecodedImage, ImageAttributes, PixelBuffer};

// =============================================================================
// Decode Result
// =============================================================================

/// An accepted decode.
#[derive(Debug)]
pub struct DecodeResult {
    pub attributes: ImageAttributes,

    /// Decoded pixels; a pooled buffer returns to its pool when dropped
    pub image: DecodedImage,

    pub sample_size: u32,

    /// Strategy that produced the image
    pub strategy: DecodeStrategy,

    /// Whether the result should be stored in the processed cache
    pub eligibility: CacheEligibility,
}

impl DecodeResult {
    /// Whether the result is tagged for the processed cache.
    pub fn is_processed(&self) -> bool {
        self.eligibility.allowed_by_policy
    }
}

// =============================================================================
// Decode Pipeline
// =============================================================================

/// Coordinates one decode attempt per call.
///
/// A pipeline is shared across worker threads; the buffer pool's lock is the
/// only synchronization between concurrent decodes.
pub struct DecodePipeline {
    codec: Arc<dyn ImageCodec>,
    pool: Arc<BufferPool>,
    calculator: SizeCalculator,
    monitor: Arc<dyn DecodeMonitor>,
}

impl DecodePipeline {
    /// Create a pipeline using the `image` crate codec and tracing monitor.
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            codec: Arc::new(ImageCrateCodec::new()),
            pool,
            calculator: SizeCalculator::new(),
            monitor: Arc::new(TracingMonitor),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn DecodeMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_size_calculator(mut self, calculator: SizeCalculator) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn codec(&self) -> &Arc<dyn ImageCodec> {
        &self.codec
    }

    /// Decode `source` for `request`.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::Source`] if the source cannot supply bytes
    /// - [`DecodeError::BoundsProbe`] if the header cannot be read
    /// - [`DecodeError::Fatal`] if decoding fails, including a failure of the
    ///   retry after a buffer mismatch
    /// - [`DecodeError::Validation`] if the decoded image is unusable
    /// - [`DecodeError::Cancelled`] if the request was cancelled
    pub fn decode(
        &self,
        request: &DecodeRequest,
        source: &dyn DataSource,
    ) -> Result<DecodeResult, DecodeError> {
        let data = source
            .open_for_decode()
            .map_err(|e| self.fail(request, source, None, e.into()))?;

        let probe = source
            .probe_bounds(self.codec.as_ref(), &data)
            .and_then(|probe| {
                if probe.width == 0 || probe.height == 0 {
                    Err(DecodeError::BoundsProbe {
                        message: format!("empty image bounds {}x{}", probe.width, probe.height),
                    })
                } else {
                    Ok(probe)
                }
            })
            .map_err(|e| self.fail(request, source, None, e))?;

        let strategy = DecodeStrategy::select(source, &probe);

        let mut options = DecodeOptions::new(request.options.output_format);
        options.bounds = Some(probe.clone());
        options.sample_size = strategy.sample_size(&self.calculator, &request.options, &probe);

        debug!(
            uri = %request.uri,
            strategy = strategy.name(),
            width = probe.width,
            height = probe.height,
            mime_type = %probe.mime_type,
            sample_size = options.sample_size,
            "Decoding image"
        );

        if request.is_cancelled() {
            return Err(self.fail(request, source, Some(&probe), DecodeError::Cancelled));
        }

        if request.options.buffer_pool_enabled && self.codec.supports_buffer_reuse(&probe.mime_type)
        {
            options.reused_buffer = self.lend_buffer(&options);
        }

        let (image, orientation_degrees) = self
            .decode_with_retry(request, &data, &probe, &mut options)
            .map_err(|e| self.fail(request, source, Some(&probe), e))?;

        if request.is_cancelled() {
            self.reclaim(image.into_buffer());
            return Err(self.fail(request, source, Some(&probe), DecodeError::Cancelled));
        }

        if image.width() <= 1 || image.height() <= 1 || !image.is_intact() {
            warn!(
                uri = %request.uri,
                image_width = probe.width,
                image_height = probe.height,
                decoded_width = image.width(),
                decoded_height = image.height(),
                "Decoded image is too small or incomplete"
            );
            let error = DecodeError::Validation {
                width: image.width(),
                height: image.height(),
            };
            self.reclaim(image.into_buffer());
            return Err(self.fail(request, source, Some(&probe), error));
        }

        let sample_size = options.sample_size;
        source.on_decode_success(probe.width, probe.height, &probe.mime_type, sample_size);

        let policy = ProcessedImagePolicy::for_options(&request.options);
        Ok(DecodeResult {
            attributes: strategy.attributes(source, &probe, orientation_degrees),
            image,
            sample_size,
            strategy,
            eligibility: strategy.cache_eligibility(&policy, sample_size),
        })
    }

    /// Borrow a pooled buffer for the expected frame, registering a new
    /// entry when nothing free fits.
    fn lend_buffer(&self, options: &DecodeOptions) -> Option<PixelBuffer> {
        let (width, height) = options.expected_dimensions()?;
        let format = options.output_format;
        let buffer = self
            .pool
            .acquire(width, height, format)
            .unwrap_or_else(|| self.pool.allocate(width, height, format));
        Some(buffer)
    }

    /// Run the codec; on a buffer mismatch, retry exactly once without reuse.
    fn decode_with_retry(
        &self,
        request: &DecodeRequest,
        data: &Bytes,
        probe: &BoundsProbe,
        options: &mut DecodeOptions,
    ) -> Result<(DecodedImage, u32), DecodeError> {
        let outcome = match self.run_codec(data, options) {
            DecodeOutcome::RetryableBufferMismatch { reason } => {
                self.reclaim_attached(options);
                let mismatch = DecodeError::BufferMismatch { message: reason };
                self.monitor
                    .on_buffer_mismatch(&mismatch, request, probe.width, probe.height);
                self.run_codec(data, options)
            }
            outcome => outcome,
        };

        // Whatever happened, the codec no longer needs a lent buffer.
        self.reclaim_attached(options);

        match outcome {
            DecodeOutcome::Success {
                image,
                orientation_degrees,
            } => Ok((image, orientation_degrees)),
            DecodeOutcome::RetryableBufferMismatch { reason } => Err(DecodeError::Fatal {
                message: format!("buffer mismatch without a reused buffer: {}", reason),
            }),
            DecodeOutcome::Fatal { reason } => Err(DecodeError::Fatal { message: reason }),
        }
    }

    fn run_codec(&self, data: &[u8], options: &mut DecodeOptions) -> DecodeOutcome {
        catch_unwind(AssertUnwindSafe(|| self.codec.decode(data, options))).unwrap_or_else(|_| {
            DecodeOutcome::Fatal {
                reason: "codec panicked during decode".to_string(),
            }
        })
    }

    fn reclaim_attached(&self, options: &mut DecodeOptions) {
        if let Some(buffer) = options.reused_buffer.take() {
            self.reclaim(buffer);
        }
    }

    /// Return a pool-owned buffer to the pool; other buffers are dropped.
    fn reclaim(&self, buffer: PixelBuffer) {
        if buffer.is_pooled() {
            self.pool.release(buffer);
        }
    }

    /// Report a failed attempt and resolve the data source.
    fn fail(
        &self,
        request: &DecodeRequest,
        source: &dyn DataSource,
        probe: Option<&BoundsProbe>,
        error: DecodeError,
    ) -> DecodeError {
        if !matches!(error, DecodeError::Cancelled) {
            let (width, height, mime_type) = probe
                .map(|p| (p.width, p.height, p.mime_type.as_str()))
                .unwrap_or((0, 0, ""));
            self.monitor
                .on_decode_error(&error, request, width, height, mime_type);
        }
        source.on_decode_error();
        error
    }
}

// =============================================================================
// Tests
// =============================================================================
