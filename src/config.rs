//! Configuration management for the bitmap-decode CLI.
//!
//! This module provides:
//! - Command-line arguments via clap
//! - Environment variables with `DECODE_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `DECODE_MAX_WIDTH` / `DECODE_MAX_HEIGHT` - Bounding box (default: unbounded)
//! - `DECODE_ALLOW_LARGE` - Skip the decoded pixel ceiling (default: false)
//! - `DECODE_MAX_PIXELS` - Decoded pixel ceiling (default: 4096x4096)
//! - `DECODE_FORMAT` - Output pixel format (default: rgba8)
//! - `DECODE_NO_POOL` - Disable buffer reuse (default: false)
//! - `DECODE_POOL_BYTES` / `DECODE_POOL_ENTRIES` - Pool ceilings
//! - `DECODE_PROCESSED_CACHE` - Store downsampled results (default: false)
//! - `DECODE_CACHE_CAPACITY` - Processed store capacity in bytes (default: 64MB)
//! - `DECODE_JPEG_QUALITY` - Quality of stored JPEG results (default: 85)
//! - `DECODE_CONCURRENCY` - Files decoded in parallel (default: 4)
//! - `DECODE_OUTPUT_DIR` - Directory for PNG output

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cache::{is_valid_quality, DEFAULT_JPEG_QUALITY, DEFAULT_PROCESSED_CACHE_CAPACITY};
use crate::decode::{
    PixelFormat, RequestOptions, DEFAULT_MAX_DECODED_PIXELS, DEFAULT_POOL_MAX_BYTES,
    DEFAULT_POOL_MAX_ENTRIES,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default number of files decoded in parallel.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound for `--concurrency`.
pub const MAX_CONCURRENCY: usize = 256;

// =============================================================================
// CLI Arguments
// =============================================================================

/// bitmap-decode - decode images with buffer reuse and downsampling.
#[derive(Parser, Debug, Clone)]
#[command(name = "bitmap-decode")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode images through the shared buffer pool.
    Decode(DecodeConfig),

    /// Print image bounds as JSON without decoding pixels.
    Probe(ProbeConfig),
}

/// Arguments for `bitmap-decode decode`.
#[derive(Args, Debug, Clone)]
pub struct DecodeConfig {
    /// Image files to decode.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    // =========================================================================
    // Sizing
    // =========================================================================
    /// Maximum decoded width; 0 leaves the axis unconstrained.
    #[arg(long, default_value_t = 0, env = "DECODE_MAX_WIDTH")]
    pub max_width: i32,

    /// Maximum decoded height; 0 leaves the axis unconstrained.
    #[arg(long, default_value_t = 0, env = "DECODE_MAX_HEIGHT")]
    pub max_height: i32,

    /// Skip the decoded pixel ceiling.
    #[arg(long, default_value_t = false, env = "DECODE_ALLOW_LARGE")]
    pub allow_large: bool,

    /// Decoded pixel ceiling applied unless `--allow-large` is set.
    #[arg(long, default_value_t = DEFAULT_MAX_DECODED_PIXELS, env = "DECODE_MAX_PIXELS")]
    pub max_pixels: u64,

    /// Output pixel format (rgba8, rgb8, la8, l8).
    #[arg(long, default_value = "rgba8", env = "DECODE_FORMAT")]
    pub format: PixelFormat,

    // =========================================================================
    // Buffer Pool
    // =========================================================================
    /// Decode into fresh allocations instead of pooled buffers.
    #[arg(long, default_value_t = false, env = "DECODE_NO_POOL")]
    pub no_pool: bool,

    /// Byte ceiling of the buffer pool.
    #[arg(long, default_value_t = DEFAULT_POOL_MAX_BYTES, env = "DECODE_POOL_BYTES")]
    pub pool_bytes: usize,

    /// Entry ceiling of the buffer pool.
    #[arg(long, default_value_t = DEFAULT_POOL_MAX_ENTRIES, env = "DECODE_POOL_ENTRIES")]
    pub pool_entries: usize,

    // =========================================================================
    // Processed Cache
    // =========================================================================
    /// Store downsampled results and reuse them on later passes.
    #[arg(long, default_value_t = false, env = "DECODE_PROCESSED_CACHE")]
    pub processed_cache: bool,

    /// Processed store capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_PROCESSED_CACHE_CAPACITY, env = "DECODE_CACHE_CAPACITY")]
    pub cache_capacity: usize,

    /// JPEG quality of stored opaque results (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "DECODE_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    // =========================================================================
    // Execution
    // =========================================================================
    /// Number of passes over the file list.
    #[arg(long, default_value_t = 1)]
    pub passes: usize,

    /// Files decoded in parallel.
    #[arg(short = 'j', long, default_value_t = DEFAULT_CONCURRENCY, env = "DECODE_CONCURRENCY")]
    pub concurrency: usize,

    /// Write each decoded image as PNG into this directory.
    #[arg(short, long, env = "DECODE_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl DecodeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_width < 0 || self.max_height < 0 {
            return Err("max_width and max_height must not be negative".to_string());
        }

        if self.max_pixels == 0 {
            return Err("max_pixels must be greater than 0".to_string());
        }

        if !self.no_pool && (self.pool_bytes == 0 || self.pool_entries == 0) {
            return Err(
                "pool_bytes and pool_entries must be greater than 0, or disable the pool with --no-pool"
                    .to_string(),
            );
        }

        if self.processed_cache && self.cache_capacity == 0 {
            return Err("cache_capacity must be greater than 0".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.passes == 0 {
            return Err("passes must be greater than 0".to_string());
        }

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            ));
        }

        Ok(())
    }

    /// Whether a bounding box was requested.
    pub fn has_max_size(&self) -> bool {
        self.max_width > 0 || self.max_height > 0
    }

    /// Per-request options derived from the flags.
    pub fn to_request_options(&self) -> RequestOptions {
        let options = RequestOptions::new()
            .with_large_image_allowed(self.allow_large)
            .with_buffer_pool(!self.no_pool)
            .with_processed_cache(self.processed_cache)
            .with_output_format(self.format);

        if self.has_max_size() {
            options.with_max_size(self.max_width, self.max_height)
        } else {
            options
        }
    }
}

/// Arguments for `bitmap-decode probe`.
#[derive(Args, Debug, Clone)]
pub struct ProbeConfig {
    /// Image files to probe.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
