//! Units of upload work: raw files, file tasks, validation, previews and
//! progress aggregation.

mod file;
mod preview;
mod progress;
mod task;
mod validation;

pub use file::{FileSource, MimeCategory, RawFile, detect_mime_type, format_file_size};
pub use preview::{DEFAULT_MAX_PREVIEW_BYTES, Preview, PreviewGenerator};
pub use progress::{BatchSummary, ProgressCounters, ProgressReporter, TaskUpdate, UpdateCallback};
pub use task::{FileResult, FileTask, RemoteRef, TaskId, TaskState, UploadStatus};
pub use validation::{DEFAULT_MAX_SIZE_BYTES, ValidationConfig, ValidationResult, validate};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state transition for task {task}: {from:?} -> {to:?}")]
    InvalidTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("retry budget exhausted for task {0}")]
    RetriesExhausted(TaskId),
}
