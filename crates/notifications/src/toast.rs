use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::{Notification, NotificationGateway, NotificationKind};

/// A queued toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub kind: NotificationKind,
    pub message: String,
    /// `None` stays until dismissed.
    pub duration: Option<Duration>,
}

/// In-memory toast queue with monotonic ID assignment.
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
    next_id: u64,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a notification. Returns the assigned toast ID.
    pub fn push(&mut self, notification: Notification) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push(Toast {
            id,
            kind: notification.kind,
            message: notification.message,
            duration: notification.duration,
        });
        id
    }

    /// Removes a toast by ID. Returns `true` if found and removed.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let len_before = self.toasts.len();
        self.toasts.retain(|t| t.id != id);
        self.toasts.len() != len_before
    }

    pub fn get(&self, id: u64) -> Option<&Toast> {
        self.toasts.iter().find(|t| t.id == id)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn clear(&mut self) {
        self.toasts.clear();
    }
}

/// A [`ToastQueue`] shared between the pipeline and whoever renders it.
#[derive(Debug, Default)]
pub struct SharedToastQueue {
    inner: Mutex<ToastQueue>,
}

impl SharedToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out the current toasts, oldest first.
    pub fn snapshot(&self) -> Vec<Toast> {
        self.lock().iter().cloned().collect()
    }

    pub fn dismiss(&self, id: u64) -> bool {
        self.lock().dismiss(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ToastQueue> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NotificationGateway for SharedToastQueue {
    fn notify(&self, notification: Notification) {
        let id = self.lock().push(notification);
        debug!(toast = id, "notification queued");
    }
}
