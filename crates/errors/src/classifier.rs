use tracing::{error, info, warn};

use crate::TransportFailure;
use crate::category::{ErrorCategory, Severity, UserAction};
use crate::record::{ErrorContext, ErrorRecord};

const DEFAULT_MESSAGE: &str = "An unexpected error occurred";
const VALIDATION_DEFAULT: &str = "Please check your input and try again";
const NETWORK_DEFAULT: &str = "Network error. Please check your internet connection.";
const TIMEOUT_DEFAULT: &str = "Request timed out. Please try again.";

/// One row of the status classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub retryable: bool,
    pub user_action: UserAction,
    /// Message used when the server provides none. Empty for unmapped statuses.
    pub default_message: &'static str,
}

const fn rule(
    category: ErrorCategory,
    severity: Severity,
    retryable: bool,
    user_action: UserAction,
    default_message: &'static str,
) -> ClassificationRule {
    ClassificationRule {
        category,
        severity,
        retryable,
        user_action,
        default_message,
    }
}

/// Looks up the classification for an HTTP status code.
pub fn rule_for_status(status: u16) -> ClassificationRule {
    use ErrorCategory as C;
    use Severity as S;
    use UserAction as A;

    match status {
        400 => rule(C::Validation, S::Low, false, A::FixInput, VALIDATION_DEFAULT),
        401 => rule(
            C::Auth,
            S::High,
            false,
            A::Reauthenticate,
            "Authentication required. Please log in again.",
        ),
        403 => rule(
            C::Permission,
            S::Medium,
            false,
            A::ContactAdmin,
            "You do not have permission to perform this action",
        ),
        404 => rule(
            C::NotFound,
            S::Low,
            false,
            A::VerifyResource,
            "The requested resource was not found",
        ),
        408 | 504 => rule(C::Timeout, S::Medium, true, A::Retry, TIMEOUT_DEFAULT),
        429 => rule(
            C::Network,
            S::Medium,
            true,
            A::WaitAndRetry,
            "Too many requests. Please wait a moment and try again.",
        ),
        500 | 502 | 503 => rule(
            C::Server,
            S::High,
            true,
            A::Retry,
            "Server error. Please try again later.",
        ),
        _ => rule(C::Unknown, S::Medium, false, A::None, ""),
    }
}

/// Classifies a transport failure into an [`ErrorRecord`].
pub fn classify(failure: &TransportFailure, context: &ErrorContext) -> ErrorRecord {
    match failure {
        TransportFailure::Status {
            status,
            message,
            details,
        } => {
            let rule = rule_for_status(*status);
            let message = match rule.category {
                ErrorCategory::Validation => format_validation_details(details, message.as_deref()),
                _ => non_empty(message.as_deref())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        if rule.default_message.is_empty() {
                            format!("Request failed with status {status}")
                        } else {
                            rule.default_message.to_string()
                        }
                    }),
            };
            ErrorRecord::build(
                rule.category,
                rule.severity,
                rule.retryable,
                Some(*status),
                message,
                rule.user_action,
                context,
            )
        }
        TransportFailure::NoResponse(message) => ErrorRecord::build(
            ErrorCategory::Network,
            Severity::High,
            true,
            None,
            non_empty(Some(message.as_str())).unwrap_or(NETWORK_DEFAULT).to_string(),
            UserAction::CheckConnection,
            context,
        ),
        TransportFailure::Aborted => ErrorRecord::build(
            ErrorCategory::Timeout,
            Severity::Medium,
            true,
            None,
            TIMEOUT_DEFAULT.to_string(),
            UserAction::Retry,
            context,
        ),
        TransportFailure::Other(message) => ErrorRecord::build(
            ErrorCategory::Unknown,
            Severity::Medium,
            false,
            None,
            non_empty(Some(message.as_str())).unwrap_or(DEFAULT_MESSAGE).to_string(),
            UserAction::None,
            context,
        ),
    }
}

/// Builds the record for a file rejected by local validation.
///
/// All violations are joined into one message.
pub fn classify_validation(violations: &[String], context: &ErrorContext) -> ErrorRecord {
    let message = if violations.is_empty() {
        VALIDATION_DEFAULT.to_string()
    } else {
        violations.join(", ")
    };
    ErrorRecord::build(
        ErrorCategory::Validation,
        Severity::Low,
        false,
        None,
        message,
        UserAction::FixInput,
        context,
    )
}

/// Logs a record at a level matching its severity.
pub fn log_record(record: &ErrorRecord) {
    match record.severity {
        Severity::Low => info!(
            id = %record.id,
            category = %record.category,
            operation = %record.operation_key,
            "{}", record.message
        ),
        Severity::Medium => warn!(
            id = %record.id,
            category = %record.category,
            operation = %record.operation_key,
            "{}", record.message
        ),
        Severity::High | Severity::Critical => error!(
            id = %record.id,
            category = %record.category,
            operation = %record.operation_key,
            "{}", record.message
        ),
    }
}

fn format_validation_details(details: &[String], message: Option<&str>) -> String {
    let details: Vec<&str> = details
        .iter()
        .map(String::as_str)
        .filter(|d| !d.is_empty())
        .collect();
    match details.as_slice() {
        [] => non_empty(message).unwrap_or(VALIDATION_DEFAULT).to_string(),
        [single] => (*single).to_string(),
        many => format!("Validation errors: {}", many.join(", ")),
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::new("upload:test")
    }

    #[test]
    fn status_table() {
        let cases = [
            (400, ErrorCategory::Validation, Severity::Low, false),
            (401, ErrorCategory::Auth, Severity::High, false),
            (403, ErrorCategory::Permission, Severity::Medium, false),
            (404, ErrorCategory::NotFound, Severity::Low, false),
            (408, ErrorCategory::Timeout, Severity::Medium, true),
            (504, ErrorCategory::Timeout, Severity::Medium, true),
            (429, ErrorCategory::Network, Severity::Medium, true),
            (500, ErrorCategory::Server, Severity::High, true),
            (502, ErrorCategory::Server, Severity::High, true),
            (503, ErrorCategory::Server, Severity::High, true),
            (418, ErrorCategory::Unknown, Severity::Medium, false),
        ];
        for (status, category, severity, retryable) in cases {
            let record = classify(&TransportFailure::status(status), &ctx());
            assert_eq!(record.category, category, "status {status}");
            assert_eq!(record.severity, severity, "status {status}");
            assert_eq!(record.retryable, retryable, "status {status}");
            assert_eq!(record.status_code, Some(status));
        }
    }

    #[test]
    fn rate_limit_waits() {
        let record = classify(&TransportFailure::status(429), &ctx());
        assert_eq!(record.user_action, UserAction::WaitAndRetry);
        assert!(record.is_rate_limited());
    }

    #[test]
    fn server_message_wins_over_default() {
        let failure = TransportFailure::status_with_message(403, "farm is locked");
        let record = classify(&failure, &ctx());
        assert_eq!(record.message, "farm is locked");
    }

    #[test]
    fn blank_server_message_falls_back() {
        let failure = TransportFailure::status_with_message(404, "   ");
        let record = classify(&failure, &ctx());
        assert_eq!(record.message, "The requested resource was not found");
    }

    #[test]
    fn unmapped_status_mentions_code() {
        let record = classify(&TransportFailure::status(418), &ctx());
        assert_eq!(record.message, "Request failed with status 418");
        assert_eq!(record.user_action, UserAction::None);
    }

    #[test]
    fn validation_details_single_and_many() {
        let single = TransportFailure::Status {
            status: 400,
            message: Some("Validation failed".into()),
            details: vec!["name is required".into()],
        };
        assert_eq!(classify(&single, &ctx()).message, "name is required");

        let many = TransportFailure::Status {
            status: 400,
            message: None,
            details: vec!["name is required".into(), "too many tags".into()],
        };
        assert_eq!(
            classify(&many, &ctx()).message,
            "Validation errors: name is required, too many tags"
        );

        let none = TransportFailure::status(400);
        assert_eq!(classify(&none, &ctx()).message, VALIDATION_DEFAULT);
    }

    #[test]
    fn no_response_is_retryable_network() {
        let record = classify(&TransportFailure::NoResponse(String::new()), &ctx());
        assert_eq!(record.category, ErrorCategory::Network);
        assert_eq!(record.severity, Severity::High);
        assert!(record.retryable);
        assert_eq!(record.message, NETWORK_DEFAULT);
        assert_eq!(record.user_action, UserAction::CheckConnection);
        assert_eq!(record.status_code, None);
    }

    #[test]
    fn abort_is_retryable_timeout() {
        let record = classify(&TransportFailure::Aborted, &ctx());
        assert_eq!(record.category, ErrorCategory::Timeout);
        assert!(record.retryable);
    }

    #[test]
    fn other_failure_keeps_message() {
        let record = classify(&TransportFailure::Other("disk on fire".into()), &ctx());
        assert_eq!(record.category, ErrorCategory::Unknown);
        assert!(!record.retryable);
        assert_eq!(record.message, "disk on fire");

        let empty = classify(&TransportFailure::Other(String::new()), &ctx());
        assert_eq!(empty.message, DEFAULT_MESSAGE);
    }

    #[test]
    fn local_validation_joins_violations() {
        let violations = vec![
            "File size must be less than 50 MB".to_string(),
            "File type text/plain is not allowed".to_string(),
        ];
        let record = classify_validation(&violations, &ctx());
        assert_eq!(record.category, ErrorCategory::Validation);
        assert!(!record.retryable);
        assert_eq!(
            record.message,
            "File size must be less than 50 MB, File type text/plain is not allowed"
        );
    }

    #[test]
    fn context_is_carried() {
        let context = ErrorContext::new("upload:abc").with_file_name("goat.wav");
        let record = classify(&TransportFailure::status(500), &context);
        assert_eq!(record.operation_key, "upload:abc");
        assert_eq!(record.file_name.as_deref(), Some("goat.wav"));
    }
}
