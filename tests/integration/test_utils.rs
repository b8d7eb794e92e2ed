//! Test utilities for integration tests.
//!
//! This module provides tracking data sources, a recording monitor and
//! helpers for encoding test images in memory.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use bitmap_decode::decode::{DataSource, DecodeMonitor, DecodeRequest};
use bitmap_decode::{DecodeError, SourceError};

// =============================================================================
// Tracking Data Source
// =============================================================================

/// A data source that records every callback made by the pipeline.
#[derive(Clone)]
pub struct TrackingSource {
    data: Bytes,
    open_count: Arc<AtomicUsize>,
    error_count: Arc<AtomicUsize>,
    successes: Arc<Mutex<Vec<(u32, u32, String, u32)>>>,
}

impl TrackingSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
            open_count: Arc::new(AtomicUsize::new(0)),
            error_count: Arc::new(AtomicUsize::new(0)),
            successes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::SeqCst)
    }

    /// `(width, height, mime_type, sample_size)` per successful decode.
    pub fn successes(&self) -> Vec<(u32, u32, String, u32)> {
        self.successes.lock().unwrap().clone()
    }

    /// Total number of outcome callbacks received.
    pub fn notifications(&self) -> usize {
        self.error_count() + self.successes.lock().unwrap().len()
    }
}

impl DataSource for TrackingSource {
    fn open_for_decode(&self) -> Result<Bytes, SourceError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.data.clone())
    }

    fn on_decode_success(&self, width: u32, height: u32, mime_type: &str, sample_size: u32) {
        self.successes
            .lock()
            .unwrap()
            .push((width, height, mime_type.to_string(), sample_size));
    }

    fn on_decode_error(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Recording Monitor
// =============================================================================

/// A monitor that records the kind of every reported error.
#[derive(Default)]
pub struct RecordingMonitor {
    errors: Mutex<Vec<&'static str>>,
    mismatches: AtomicUsize,
}

impl RecordingMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<&'static str> {
        self.errors.lock().unwrap().clone()
    }

    pub fn mismatches(&self) -> usize {
        self.mismatches.load(Ordering::SeqCst)
    }
}

impl DecodeMonitor for RecordingMonitor {
    fn on_decode_error(
        &self,
        error: &DecodeError,
        _request: &DecodeRequest,
        _width: u32,
        _height: u32,
        _mime_type: &str,
    ) {
        self.errors.lock().unwrap().push(error.kind());
    }

    fn on_buffer_mismatch(
        &self,
        _error: &DecodeError,
        _request: &DecodeRequest,
        _width: u32,
        _height: u32,
    ) {
        self.mismatches.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Test Images
// =============================================================================

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("Failed to encode test image");
    buf
}

/// Pixel value that does not compress well.
fn noise(x: u32, y: u32, channel: u32) -> u8 {
    (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ channel.wrapping_mul(97)) as u8
}

/// Create an RGBA PNG with a gradient.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

/// Create an RGBA PNG whose pixel data is mostly incompressible.
pub fn create_noisy_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([noise(x, y, 0), noise(x, y, 1), noise(x, y, 2), 255])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
}

/// Create an RGB JPEG with a gradient.
pub fn create_test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg)
}

/// Create a GIF with a gradient.
pub fn create_test_gif(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
    });
    encode(DynamicImage::ImageRgba8(img), ImageFormat::Gif)
}

/// Write `data` into a fresh file under the system temp directory.
pub fn write_temp_file(name: &str, data: &[u8]) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "bitmap-decode-it-{}-{}",
        std::process::id(),
        unique
    ));
    std::fs::create_dir_all(&dir).expect("Failed to create temp dir");
    let path = dir.join(name);
    std::fs::write(&path, data).expect("Failed to write temp file");
    path
}
