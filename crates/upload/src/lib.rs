//! Batch upload pipeline.
//!
//! [`UploadScheduler`] takes a batch of [`RawFile`]s, validates them, and
//! uploads the valid ones through an [`UploadTransport`] with a bounded
//! number in flight. Failures are classified into an [`ErrorRecord`];
//! transient ones are retried by the [`RetryScheduler`] with exponential
//! backoff (fixed delay for rate limits). The returned [`BatchResult`]
//! lists every task in submission order.
//!
//! Progress is observable three ways: [`UploadScheduler::on_update`]
//! callbacks, the [`UploadEvent`] channel from
//! [`UploadScheduler::take_events`], and the task states in the result.
//! The channel applies back-pressure; only progress ticks are dropped when
//! the consumer falls behind.
//!
//! [`RawFile`]: pashumitra_transfer::RawFile
//! [`ErrorRecord`]: pashumitra_errors::ErrorRecord

pub mod context;
pub mod error;
pub mod local;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod transport;
pub mod types;

pub use context::BatchContext;
pub use error::UploadError;
pub use local::LocalDirTransport;
pub use retry::{RetryDecision, RetryEntry, RetryKind, RetryPolicy, RetryScheduler, ScheduledRetry};
pub use scheduler::UploadScheduler;
pub use settings::{ConfigError, DispatchMode, UploadSettings};
pub use transport::{AuthSessionManager, ProgressFn, UploadTransport};
pub use types::{BatchResult, UploadEvent};
