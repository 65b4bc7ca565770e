// Real-time path error types
//
// RenderError never crosses the real-time boundary as a panic or a returned
// control-path error. The frame producer converts it into a dropped frame and
// queues it for the control thread to report.

use crate::error::ErrorCode;
use std::fmt;

/// Real-time error code constants
///
/// Error code range: 2001-2003
pub struct RenderErrorCodes {}

impl RenderErrorCodes {
    /// Destination buffer cannot hold the requested samples
    pub const BUFFER_TOO_SMALL: i32 = 2001;

    /// Frame region could not be sized or mapped
    pub const ALLOCATION_FAILED: i32 = 2002;

    /// Channel count or sample rate is zero
    pub const INVALID_FORMAT: i32 = 2003;
}

/// Errors raised while producing a frame on the real-time thread
///
/// All variants are plain data so the value can be pushed through a
/// lock-free queue without touching the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// Destination buffer holds fewer floats than `required`
    BufferTooSmall { required: usize, capacity: usize },

    /// Frame region of `requested_bytes` could not be sized or mapped
    AllocationFailed { requested_bytes: usize },

    /// Channel count or sample rate is zero
    InvalidFormat,
}

impl ErrorCode for RenderError {
    fn code(&self) -> i32 {
        match self {
            RenderError::BufferTooSmall { .. } => RenderErrorCodes::BUFFER_TOO_SMALL,
            RenderError::AllocationFailed { .. } => RenderErrorCodes::ALLOCATION_FAILED,
            RenderError::InvalidFormat => RenderErrorCodes::INVALID_FORMAT,
        }
    }

    fn message(&self) -> String {
        match self {
            RenderError::BufferTooSmall { required, capacity } => format!(
                "Buffer too small: need {} samples, capacity {}",
                required, capacity
            ),
            RenderError::AllocationFailed { requested_bytes } => {
                format!("Failed to allocate frame of {} bytes", requested_bytes)
            }
            RenderError::InvalidFormat => {
                "Channel count and sample rate must be non-zero".to_string()
            }
        }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for RenderError {}
