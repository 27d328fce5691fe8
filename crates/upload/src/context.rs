//! Per-batch shared state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use pashumitra_errors::{ErrorCategory, ErrorContext, ErrorHistory, ErrorRecord, Severity};

use crate::retry::{RetryPolicy, RetryScheduler};

pub(crate) const CANCELLED_MESSAGE: &str = "upload cancelled";
pub(crate) const AUTH_ABANDONED_MESSAGE: &str = "upload abandoned: authentication required";
pub(crate) const INTERRUPTED_MESSAGE: &str = "upload interrupted";

/// State owned by one batch run: retry counters, the error history and the
/// cancellation signal. Nothing here outlives the batch.
pub struct BatchContext {
    cancel: CancellationToken,
    retries: RetryScheduler,
    history: Mutex<ErrorHistory>,
    auth_failed: AtomicBool,
}

impl BatchContext {
    /// `cancel` should be a child of the scheduler's token so a scheduler
    /// cancel reaches the batch, but not the other way round.
    pub fn new(cancel: CancellationToken, policy: RetryPolicy, history_capacity: usize) -> Self {
        let retries = RetryScheduler::new(policy, cancel.child_token());
        Self {
            cancel,
            retries,
            history: Mutex::new(ErrorHistory::new(history_capacity)),
            auth_failed: AtomicBool::new(false),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn retries(&self) -> &RetryScheduler {
        &self.retries
    }

    pub fn record_error(&self, record: ErrorRecord) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Marks the batch as failed on authentication and cancels it.
    ///
    /// Returns `true` only for the first caller.
    pub fn abort_for_auth(&self) -> bool {
        let first = !self.auth_failed.swap(true, Ordering::SeqCst);
        self.cancel.cancel();
        first
    }

    pub fn auth_failed(&self) -> bool {
        self.auth_failed.load(Ordering::SeqCst)
    }

    /// The record given to a task the batch gives up on.
    pub fn abandon_record(&self, context: &ErrorContext) -> ErrorRecord {
        if self.auth_failed() {
            ErrorRecord::terminal(
                ErrorCategory::Auth,
                Severity::High,
                AUTH_ABANDONED_MESSAGE,
                context,
            )
        } else {
            ErrorRecord::terminal(
                ErrorCategory::Unknown,
                Severity::Medium,
                CANCELLED_MESSAGE,
                context,
            )
        }
    }

    /// Consumes the context, returning the error history.
    pub fn into_history(self) -> ErrorHistory {
        self.history.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> BatchContext {
        BatchContext::new(CancellationToken::new(), RetryPolicy::default(), 2)
    }

    #[test]
    fn auth_abort_happens_once() {
        let ctx = context();
        assert!(ctx.abort_for_auth());
        assert!(!ctx.abort_for_auth());
        assert!(ctx.is_cancelled());
        assert!(ctx.auth_failed());
    }

    #[test]
    fn abandon_record_follows_cause() {
        let ctx = context();
        let key = ErrorContext::new("upload:x");

        let cancelled = ctx.abandon_record(&key);
        assert_eq!(cancelled.category, ErrorCategory::Unknown);
        assert_eq!(cancelled.message, CANCELLED_MESSAGE);
        assert!(!cancelled.retryable);

        ctx.abort_for_auth();
        let abandoned = ctx.abandon_record(&key);
        assert_eq!(abandoned.category, ErrorCategory::Auth);
        assert_eq!(abandoned.message, AUTH_ABANDONED_MESSAGE);
    }

    #[test]
    fn history_is_capped() {
        let ctx = context();
        for _ in 0..3 {
            ctx.record_error(ctx.abandon_record(&ErrorContext::new("k")));
        }
        assert_eq!(ctx.into_history().len(), 2);
    }

    #[test]
    fn parent_cancel_reaches_retries_but_not_upwards() {
        let parent = CancellationToken::new();
        let ctx = BatchContext::new(parent.child_token(), RetryPolicy::default(), 50);
        ctx.retries().cancel_all();
        assert!(!ctx.is_cancelled());

        parent.cancel();
        assert!(ctx.is_cancelled());
    }
}
