//! Error taxonomy shared by the upload pipeline.
//!
//! Transport failures are mapped onto a closed [`ErrorCategory`] with a
//! [`Severity`] and a retry verdict by [`classify`]. Every classified error
//! becomes an [`ErrorRecord`], which callers keep in a capped
//! [`ErrorHistory`] for later inspection.

mod category;
mod classifier;
mod history;
mod record;

pub use category::{ErrorCategory, Severity, UserAction};
pub use classifier::{ClassificationRule, classify, classify_validation, log_record, rule_for_status};
pub use history::{DEFAULT_HISTORY_CAPACITY, ErrorHistory, ErrorStats};
pub use record::{ErrorContext, ErrorRecord};

/// A failed transport call, as reported by an upload transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    /// The server answered with a non-success status.
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        /// Server-provided message, if any.
        message: Option<String>,
        /// Individual validation messages (400 responses).
        details: Vec<String>,
    },

    /// The request was sent but no response arrived (connectivity).
    #[error("no response received: {0}")]
    NoResponse(String),

    /// The client aborted the request, usually on its own timeout.
    #[error("request aborted")]
    Aborted,

    /// Any other failure with a free-form message.
    #[error("{0}")]
    Other(String),
}

impl TransportFailure {
    /// A bare status failure with no message.
    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            message: None,
            details: Vec::new(),
        }
    }

    /// A status failure carrying a server message.
    pub fn status_with_message(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: Some(message.into()),
            details: Vec::new(),
        }
    }

    /// Returns the HTTP status code, if the server responded.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
