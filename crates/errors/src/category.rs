use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Auth,
    Validation,
    Server,
    Permission,
    NotFound,
    Timeout,
    Unknown,
}

impl ErrorCategory {
    /// Stable lowercase name, used in logs and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Server => "server",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious an error is for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// How long a notification for this severity stays on screen.
    ///
    /// `None` means it persists until dismissed.
    pub fn notification_duration(&self) -> Option<Duration> {
        match self {
            Self::Low => Some(Duration::from_secs(4)),
            Self::Medium => Some(Duration::from_secs(6)),
            Self::High => Some(Duration::from_secs(8)),
            Self::Critical => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// What the user (or the app on their behalf) should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    FixInput,
    /// Global: clear the session and go back to login.
    Reauthenticate,
    ContactAdmin,
    VerifyResource,
    Retry,
    /// Rate limited; wait before retrying.
    WaitAndRetry,
    CheckConnection,
    /// Nothing to do beyond showing the message.
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_durations() {
        assert_eq!(Severity::Low.notification_duration(), Some(Duration::from_secs(4)));
        assert_eq!(Severity::Medium.notification_duration(), Some(Duration::from_secs(6)));
        assert_eq!(Severity::High.notification_duration(), Some(Duration::from_secs(8)));
        assert_eq!(Severity::Critical.notification_duration(), None);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn category_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }
}
