//! Delayed retries keyed by operation.
//!
//! Each operation key gets a retry counter. [`RetryScheduler::schedule_retry`]
//! either refuses (budget spent) or spawns a timer that runs the attempt
//! callback after the backoff delay. Timers are cancellable one by one or
//! all at once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Retry limits and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed per operation key.
    pub max_attempts: u32,
    /// First backoff delay; doubles with every retry.
    pub base_delay: Duration,
    /// Fixed delay after a rate-limit response.
    pub rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            rate_limit_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempts` earlier retries.
    ///
    /// Backoff is `2^attempts * base_delay`; rate limits ignore `attempts`.
    pub fn delay_for(&self, attempts: u32, kind: RetryKind) -> Duration {
        match kind {
            RetryKind::RateLimited => self.rate_limit_delay,
            RetryKind::Backoff => {
                let factor = 1u32.checked_shl(attempts).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        }
    }
}

/// Which delay rule a retry follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Backoff,
    RateLimited,
}

/// Retry bookkeeping for one operation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub operation_key: String,
    /// Retries scheduled so far.
    pub attempts: u32,
    /// When the most recently scheduled retry fires.
    pub next_attempt_at: Instant,
    pub last_delay: Duration,
}

/// Outcome of [`RetryScheduler::schedule_retry`].
#[derive(Debug)]
pub enum RetryDecision<T> {
    Scheduled(ScheduledRetry<T>),
    /// The key already used its whole budget; nothing was scheduled.
    Exhausted { attempts: u32 },
}

/// A pending retry timer.
///
/// Dropping it leaves the timer running; the callback still fires.
#[derive(Debug)]
pub struct ScheduledRetry<T> {
    attempt: u32,
    delay: Duration,
    cancel: CancellationToken,
    handle: JoinHandle<Option<T>>,
}

impl<T> ScheduledRetry<T> {
    /// 1-based retry number for this key.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Stops the timer. The callback will not run if it has not started.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the callback. `None` if the retry was cancelled first.
    pub async fn wait(self) -> Option<T> {
        self.handle.await.ok().flatten()
    }
}

/// Schedules delayed retries and tracks per-key attempt counters.
pub struct RetryScheduler {
    policy: RetryPolicy,
    entries: Mutex<HashMap<String, RetryEntry>>,
    cancel: CancellationToken,
}

impl RetryScheduler {
    /// Creates a scheduler whose timers stop when `cancel` fires.
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Counts a retry for `operation_key` and runs `callback` after the
    /// delay, unless the key's budget is spent.
    ///
    /// Must be called within a tokio runtime.
    pub fn schedule_retry<F, Fut, T>(
        &self,
        operation_key: &str,
        kind: RetryKind,
        callback: F,
    ) -> RetryDecision<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (attempt, delay) = {
            let mut entries = self.lock();
            let entry = entries
                .entry(operation_key.to_string())
                .or_insert_with(|| RetryEntry {
                    operation_key: operation_key.to_string(),
                    attempts: 0,
                    next_attempt_at: Instant::now(),
                    last_delay: Duration::ZERO,
                });
            if entry.attempts >= self.policy.max_attempts {
                debug!(key = operation_key, attempts = entry.attempts, "retry budget exhausted");
                return RetryDecision::Exhausted {
                    attempts: entry.attempts,
                };
            }
            let delay = self.policy.delay_for(entry.attempts, kind);
            entry.attempts += 1;
            entry.next_attempt_at = Instant::now() + delay;
            entry.last_delay = delay;
            (entry.attempts, delay)
        };

        debug!(
            key = operation_key,
            attempt,
            delay_ms = delay.as_millis() as u64,
            ?kind,
            "retry scheduled"
        );

        let cancel = self.cancel.child_token();
        let token = cancel.clone();
        let key = operation_key.to_string();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!(key = %key, "retry cancelled");
                    None
                }
                _ = tokio::time::sleep(delay) => Some(callback().await),
            }
        });

        RetryDecision::Scheduled(ScheduledRetry {
            attempt,
            delay,
            cancel,
            handle,
        })
    }

    /// Retries scheduled so far for `operation_key`.
    pub fn attempts(&self, operation_key: &str) -> u32 {
        self.lock().get(operation_key).map_or(0, |e| e.attempts)
    }

    /// All entries, ordered by key.
    pub fn entries(&self) -> Vec<RetryEntry> {
        let mut entries: Vec<RetryEntry> = self.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.operation_key.cmp(&b.operation_key));
        entries
    }

    /// Cancels every pending timer. Later retries are cancelled immediately.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RetryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
