//! Progress reporting and user-facing notifications.

use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Message delivered to whatever drives the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `completed` of `total` units done. Both are 0 for plain status messages.
    Progress {
        completed: usize,
        total: usize,
        message: String,
    },
    Error { message: String, detail: String },
}

impl Notification {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Progress {
            completed: 0,
            total: 0,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>, err: &dyn std::fmt::Display) -> Self {
        Self::Error {
            message: message.into(),
            detail: err.to_string(),
        }
    }
}

/// Receiver side of notifications. Called from worker threads.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _notification: Notification) {}
}

/// Forwards notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Notification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send(notification);
    }
}

/// Shared progress counter for one render pass.
///
/// `total` is measured in phones; each finished phrase adds its phone count.
pub struct Progress {
    total: usize,
    completed: AtomicUsize,
    sink: Arc<dyn NotificationSink>,
}

impl Progress {
    pub fn new(total: usize, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            sink,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Record `units` more finished phones and publish `info`.
    pub fn complete(&self, units: usize, info: impl Into<String>) {
        let completed = self.completed.fetch_add(units, Ordering::AcqRel) + units;
        self.sink.notify(Notification::Progress {
            completed,
            total: self.total,
            message: info.into(),
        });
    }

    /// Reset the progress display once a pass is done.
    pub fn clear(&self) {
        self.sink.notify(Notification::status(""));
    }

    pub fn sink(&self) -> &Arc<dyn NotificationSink> {
        &self.sink
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("total", &self.total)
            .field("completed", &self.completed())
            .finish()
    }
}
