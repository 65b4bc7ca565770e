// Control-path error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Control-path error code constants
///
/// Single source of truth for the numbers carried by notifications and logs.
///
/// Error code range: 1001-1007
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Graph, device output, or frame input node could not be created
    pub const CREATION_FAILED: i32 = 1001;

    /// Channel count change requested while streams are running
    pub const CONFIGURATION_CONFLICT: i32 = 1002;

    /// Stream or channel count outside the supported range
    pub const INVALID_CONFIGURATION: i32 = 1003;

    /// Quantum handler replacement attempted on a running node
    pub const HANDLER_BUSY: i32 = 1004;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1005;

    /// Output device reported an error
    pub const DEVICE_ERROR: i32 = 1006;

    /// Node was removed from its graph by a reset
    pub const NODE_REMOVED: i32 = 1007;
}

/// Graph object whose creation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreationTarget {
    Graph,
    DeviceOutput,
    FrameInputNode,
}

impl fmt::Display for CreationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreationTarget::Graph => "audio graph",
            CreationTarget::DeviceOutput => "device output node",
            CreationTarget::FrameInputNode => "frame input node",
        };
        f.write_str(name)
    }
}

/// Log a control-path error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=StreamSet, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Control-path errors
///
/// These cover graph construction, stream set configuration, and node
/// wiring. None of them are ever raised on the real-time thread.
///
/// Error code range: 1001-1007
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Graph, device output, or frame input node could not be created
    CreationFailed {
        target: CreationTarget,
        reason: String,
    },

    /// Channel count change requested while streams are running
    ConfigurationConflict {
        running_channels: u16,
        requested_channels: u16,
    },

    /// Stream or channel count outside the supported range
    InvalidConfiguration { reason: String },

    /// Quantum handler replacement attempted on a running node
    HandlerBusy,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Output device reported an error
    DeviceError { details: String },

    /// Node was removed from its graph by a reset
    NodeRemoved,
}

impl AudioError {
    pub fn creation(target: CreationTarget, reason: impl Into<String>) -> Self {
        AudioError::CreationFailed {
            target,
            reason: reason.into(),
        }
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::CreationFailed { .. } => AudioErrorCodes::CREATION_FAILED,
            AudioError::ConfigurationConflict { .. } => AudioErrorCodes::CONFIGURATION_CONFLICT,
            AudioError::InvalidConfiguration { .. } => AudioErrorCodes::INVALID_CONFIGURATION,
            AudioError::HandlerBusy => AudioErrorCodes::HANDLER_BUSY,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::DeviceError { .. } => AudioErrorCodes::DEVICE_ERROR,
            AudioError::NodeRemoved => AudioErrorCodes::NODE_REMOVED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::CreationFailed { target, reason } => {
                format!("Failed to create {}: {}", target, reason)
            }
            AudioError::ConfigurationConflict {
                running_channels,
                requested_channels,
            } => format!(
                "Cannot change channel count from {} to {} while streams are running. Call stop_all() first.",
                running_channels, requested_channels
            ),
            AudioError::InvalidConfiguration { reason } => {
                format!("Invalid configuration: {}", reason)
            }
            AudioError::HandlerBusy => {
                "Quantum handler cannot be replaced while the node is running".to_string()
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::DeviceError { details } => format!("Device error: {}", details),
            AudioError::NodeRemoved => {
                "Node was removed from its graph. Rebuild the stream set.".to_string()
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(
            AudioError::creation(CreationTarget::Graph, "test").code(),
            AudioErrorCodes::CREATION_FAILED
        );
        assert_eq!(
            AudioError::ConfigurationConflict {
                running_channels: 2,
                requested_channels: 1
            }
            .code(),
            AudioErrorCodes::CONFIGURATION_CONFLICT
        );
        assert_eq!(
            AudioError::InvalidConfiguration {
                reason: "test".to_string()
            }
            .code(),
            AudioErrorCodes::INVALID_CONFIGURATION
        );
        assert_eq!(AudioError::HandlerBusy.code(), AudioErrorCodes::HANDLER_BUSY);
        assert_eq!(
            AudioError::LockPoisoned {
                component: "test".to_string()
            }
            .code(),
            AudioErrorCodes::LOCK_POISONED
        );
        assert_eq!(
            AudioError::DeviceError {
                details: "test".to_string()
            }
            .code(),
            AudioErrorCodes::DEVICE_ERROR
        );
        assert_eq!(AudioError::NodeRemoved.code(), AudioErrorCodes::NODE_REMOVED);
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::creation(CreationTarget::DeviceOutput, "no device");
        assert_eq!(
            err.message(),
            "Failed to create device output node: no device"
        );

        let err = AudioError::ConfigurationConflict {
            running_channels: 2,
            requested_channels: 6,
        };
        assert!(err.message().contains("from 2 to 6"));

        let err = AudioError::NodeRemoved;
        assert!(err.message().contains("removed"));
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::HandlerBusy;
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains(&err.code().to_string()));
    }
}
