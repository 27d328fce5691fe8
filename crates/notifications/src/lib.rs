//! User-facing notifications for classified errors.
//!
//! The upload pipeline talks to a [`NotificationGateway`]; the UI decides
//! how to render. [`ToastQueue`] is the in-memory implementation: it holds
//! the queue and exposes add/remove, while timer-based dismissal stays a UI
//! concern.

mod toast;

use std::time::Duration;

use pashumitra_errors::{ErrorCategory, ErrorRecord};

pub use toast::{SharedToastQueue, Toast, ToastQueue};

/// The visual category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    /// How long to show it. `None` persists until dismissed.
    pub duration: Option<Duration>,
}

impl Notification {
    /// Builds the notification for a classified error.
    ///
    /// Duration follows the record's severity.
    pub fn from_record(record: &ErrorRecord) -> Self {
        let kind = match record.category {
            ErrorCategory::Validation | ErrorCategory::Permission => NotificationKind::Warning,
            ErrorCategory::NotFound => NotificationKind::Info,
            ErrorCategory::Network
            | ErrorCategory::Auth
            | ErrorCategory::Server
            | ErrorCategory::Timeout
            | ErrorCategory::Unknown => NotificationKind::Error,
        };
        let message = match &record.file_name {
            Some(name) => format!("{name}: {}", record.message),
            None => record.message.clone(),
        };
        Self {
            kind,
            message,
            duration: record.severity.notification_duration(),
        }
    }
}

/// Sink for user-facing notifications.
pub trait NotificationGateway: Send + Sync {
    fn notify(&self, notification: Notification);
}
