//! Notification types surfaced to whoever embeds the stream set.

use serde::{Deserialize, Serialize};

/// Severity of a notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyType {
    Status,
    Error,
}

/// One status or error message from the control side
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotifyType,
    pub message: String,
    /// Numeric error code for `Error` notifications raised from a typed error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    pub timestamp_ms: u64,
}

impl Notification {
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            kind: NotifyType::Status,
            message: message.into(),
            code: None,
            timestamp_ms: super::now_timestamp_ms(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotifyType::Error,
            message: message.into(),
            code: None,
            timestamp_ms: super::now_timestamp_ms(),
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == NotifyType::Error
    }
}
