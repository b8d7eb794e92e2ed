//! Decode failure reporting.

use tracing::{error, warn};

use crate::error::DecodeError;

use super::request::DecodeRequest;

/// Fire-and-forget sink for decode failures.
pub trait DecodeMonitor: Send + Sync {
    /// A decode attempt ended in failure.
    fn on_decode_error(
        &self,
        error: &DecodeError,
        request: &DecodeRequest,
        width: u32,
        height: u32,
        mime_type: &str,
    );

    /// A lent pool buffer was rejected by the codec; the pipeline retries
    /// without reuse after this call.
    fn on_buffer_mismatch(
        &self,
        _error: &DecodeError,
        _request: &DecodeRequest,
        _width: u32,
        _height: u32,
    ) {
    }
}

/// Monitor that reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMonitor;

impl DecodeMonitor for TracingMonitor {
    fn on_decode_error(
        &self,
        error: &DecodeError,
        request: &DecodeRequest,
        width: u32,
        height: u32,
        mime_type: &str,
    ) {
        match error {
            DecodeError::Validation { .. } => warn!(
                error_type = error.kind(),
                uri = %request.uri,
                width = width,
                height = height,
                mime_type = mime_type,
                "Rejected decoded image: {}",
                error
            ),
            _ => error!(
                error_type = error.kind(),
                uri = %request.uri,
                width = width,
                height = height,
                mime_type = mime_type,
                "Decode failed: {}",
                error
            ),
        }
    }

    fn on_buffer_mismatch(
        &self,
        error: &DecodeError,
        request: &DecodeRequest,
        width: u32,
        height: u32,
    ) {
        warn!(
            uri = %request.uri,
            width = width,
            height = height,
            "Retrying decode without buffer reuse: {}",
            error
        );
    }
}
