// Error types for the quantum synth pipeline
//
// Control-path failures (graph creation, configuration) are `AudioError` and are
// returned synchronously. Real-time failures are `RenderError`, which is `Copy`
// so it can be queued from the audio thread without allocating.

mod audio;
mod render;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes, CreationTarget};
pub use render::{RenderError, RenderErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so notifications and logs carry the same
/// numbers regardless of which layer raised the error.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
