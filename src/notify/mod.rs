//! Status and error notifications from the control side.
//!
//! The stream set manager reports through a [`NotificationSink`]. The
//! [`NotificationHub`] sink keeps a bounded history plus an async broadcast
//! stream; [`LogSink`] only forwards to the `log` facade. Notifications are
//! never raised from the audio thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;

pub mod events;

pub use events::{Notification, NotifyType};

/// Receiver of control-side notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Snapshot of hub state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NotificationSnapshot {
    pub recent: Vec<Notification>,
    pub total_notifications: u64,
    pub dropped_notifications: u64,
}

/// Broadcast-based hub retaining a bounded history of notifications.
pub struct NotificationHub {
    tx: broadcast::Sender<Notification>,
    history: Mutex<VecDeque<Notification>>,
    history_capacity: usize,
    total: AtomicU64,
    dropped_history: AtomicU64,
}

impl NotificationHub {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        // History is only ever appended to; a panic mid-push leaves it usable
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn publish(&self, notification: Notification) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if self.history_capacity > 0 {
            let mut history = self.history();
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(notification.clone());
        }

        // No subscribers is not an error
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        let history = self.history();
        NotificationSnapshot {
            recent: history.iter().cloned().collect(),
            total_notifications: self.total.load(Ordering::Relaxed),
            dropped_notifications: self.dropped_history.load(Ordering::Relaxed),
        }
    }

    /// Most recent notification, if any is retained
    pub fn last(&self) -> Option<Notification> {
        self.history().back().cloned()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

impl NotificationSink for NotificationHub {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotifyType::Status => log::info!("[Notify] {}", notification.message),
            NotifyType::Error => log::warn!("[Notify] {}", notification.message),
        }
        self.publish(notification);
    }
}

/// Sink that only writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotifyType::Status => log::info!("[Notify] {}", notification.message),
            NotifyType::Error => log::error!("[Notify] {}", notification.message),
        }
    }
}

pub(crate) fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
