use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::{ErrorCategory, Severity, UserAction};

/// Where an error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    /// Identifies the retryable unit for backoff bookkeeping.
    pub operation_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ErrorContext {
    pub fn new(operation_key: impl Into<String>) -> Self {
        Self {
            operation_key: operation_key.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }
}

/// A classified error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub message: String,
    pub user_action: UserAction,
    pub operation_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ErrorRecord {
    /// Builds a non-retryable record that did not come from a transport call.
    pub fn terminal(
        category: ErrorCategory,
        severity: Severity,
        message: impl Into<String>,
        context: &ErrorContext,
    ) -> Self {
        let user_action = match category {
            ErrorCategory::Auth => UserAction::Reauthenticate,
            ErrorCategory::Validation => UserAction::FixInput,
            _ => UserAction::None,
        };
        Self::build(category, severity, false, None, message.into(), user_action, context)
    }

    pub(crate) fn build(
        category: ErrorCategory,
        severity: Severity,
        retryable: bool,
        status_code: Option<u16>,
        message: String,
        user_action: UserAction,
        context: &ErrorContext,
    ) -> Self {
        Self {
            id: format!("err_{}", uuid::Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            category,
            severity,
            retryable,
            status_code,
            message,
            user_action,
            operation_key: context.operation_key.clone(),
            file_name: context.file_name.clone(),
        }
    }

    /// Returns `true` for 429 responses, which use a fixed retry delay.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code == Some(429)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_record_is_not_retryable() {
        let ctx = ErrorContext::new("upload:1").with_file_name("cow.png");
        let record = ErrorRecord::terminal(
            ErrorCategory::Auth,
            Severity::High,
            "session expired",
            &ctx,
        );
        assert!(!record.retryable);
        assert_eq!(record.user_action, UserAction::Reauthenticate);
        assert_eq!(record.operation_key, "upload:1");
        assert_eq!(record.file_name.as_deref(), Some("cow.png"));
        assert!(record.id.starts_with("err_"));
    }

    #[test]
    fn record_ids_are_unique() {
        let ctx = ErrorContext::new("k");
        let a = ErrorRecord::terminal(ErrorCategory::Unknown, Severity::Low, "a", &ctx);
        let b = ErrorRecord::terminal(ErrorCategory::Unknown, Severity::Low, "b", &ctx);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn record_json_uses_camel_case() {
        let ctx = ErrorContext::new("upload:7");
        let record =
            ErrorRecord::terminal(ErrorCategory::NotFound, Severity::Low, "gone", &ctx);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"operationKey\":\"upload:7\""));
        assert!(json.contains("\"userAction\""));
        assert!(!json.contains("statusCode"));
        assert!(!json.contains("fileName"));
    }
}
