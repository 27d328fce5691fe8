use std::fmt;

use pashumitra_errors::{ErrorCategory, ErrorContext, ErrorRecord};
use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::file::{MimeCategory, RawFile};

/// Opaque unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Lifecycle state of a [`FileTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Uploading,
    Completed,
    /// Terminal unless a retry picks it up again.
    Failed,
}

/// Where the transport stored a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    pub url: String,
    pub remote_id: String,
}

/// Final status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Completed,
    Failed,
}

/// One entry of a batch result, in caller-facing shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub name: String,
    pub size: u64,
    pub mime_category: MimeCategory,
    pub upload_status: UploadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<RemoteRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_error: Option<String>,
}

/// The per-file unit of upload work.
///
/// State only moves `Pending -> Uploading -> Completed | Failed`; a failed
/// task re-enters `Uploading` only through [`FileTask::start_attempt`] while
/// its retry budget lasts. Completed tasks never change again.
#[derive(Debug, Clone)]
pub struct FileTask {
    id: TaskId,
    file: RawFile,
    category: MimeCategory,
    state: TaskState,
    progress: u8,
    remote_ref: Option<RemoteRef>,
    last_error: Option<ErrorRecord>,
    attempt_count: u32,
}

impl FileTask {
    /// Creates a pending task for a file.
    pub fn new(file: RawFile) -> Self {
        let category = file.category();
        Self {
            id: TaskId::new(),
            file,
            category,
            state: TaskState::Pending,
            progress: 0,
            remote_ref: None,
            last_error: None,
            attempt_count: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn file(&self) -> &RawFile {
        &self.file
    }

    pub fn name(&self) -> &str {
        &self.file.name
    }

    pub fn size(&self) -> u64 {
        self.file.size
    }

    pub fn category(&self) -> MimeCategory {
        self.category
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn remote_ref(&self) -> Option<&RemoteRef> {
        self.remote_ref.as_ref()
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    /// Number of transport calls made so far.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Key correlating retry attempts for this task.
    pub fn operation_key(&self) -> String {
        format!("upload:{}", self.id)
    }

    pub fn error_context(&self) -> ErrorContext {
        ErrorContext::new(self.operation_key()).with_file_name(self.file.name.clone())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Failed)
    }

    /// Whether a failed task may be retried under `max_retries`.
    ///
    /// The first transport call is not a retry, so a task may see up to
    /// `max_retries + 1` calls. Validation failures are never retried.
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.state == TaskState::Failed
            && !self.failed_validation()
            && self.attempt_count <= max_retries
    }

    pub fn failed_validation(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(|e| e.category == ErrorCategory::Validation)
    }

    /// Moves the task into `Uploading` and counts a transport attempt.
    pub fn start_attempt(&mut self, max_retries: u32) -> Result<(), TransferError> {
        match self.state {
            TaskState::Pending => {}
            TaskState::Failed if self.can_retry(max_retries) => {}
            TaskState::Failed => return Err(TransferError::RetriesExhausted(self.id)),
            from @ (TaskState::Uploading | TaskState::Completed) => {
                return Err(TransferError::InvalidTransition {
                    task: self.id,
                    from,
                    to: TaskState::Uploading,
                });
            }
        }
        self.state = TaskState::Uploading;
        self.progress = 0;
        self.attempt_count += 1;
        Ok(())
    }

    /// Records transport progress. Returns `true` if the value moved.
    ///
    /// Ignored outside `Uploading`; never decreases within an attempt.
    pub fn set_progress(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.state != TaskState::Uploading || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    pub fn complete(&mut self, remote_ref: RemoteRef) -> Result<(), TransferError> {
        self.expect_uploading(TaskState::Completed)?;
        self.state = TaskState::Completed;
        self.progress = 100;
        self.remote_ref = Some(remote_ref);
        self.last_error = None;
        Ok(())
    }

    /// Records a failed transport attempt.
    pub fn fail(&mut self, error: ErrorRecord) -> Result<(), TransferError> {
        self.expect_uploading(TaskState::Failed)?;
        self.state = TaskState::Failed;
        self.last_error = Some(error);
        Ok(())
    }

    /// Fails a pending task without any transport call (validation).
    pub fn reject(&mut self, error: ErrorRecord) -> Result<(), TransferError> {
        if self.state != TaskState::Pending {
            return Err(TransferError::InvalidTransition {
                task: self.id,
                from: self.state,
                to: TaskState::Failed,
            });
        }
        self.state = TaskState::Failed;
        self.last_error = Some(error);
        Ok(())
    }

    /// Gives up on a task that has not finished. No-op on completed tasks.
    pub fn abandon(&mut self, error: ErrorRecord) {
        if self.state == TaskState::Completed {
            return;
        }
        self.state = TaskState::Failed;
        self.last_error = Some(error);
    }

    /// Caller-facing view. `None` until the task is terminal.
    pub fn result(&self) -> Option<FileResult> {
        let upload_status = match self.state {
            TaskState::Completed => UploadStatus::Completed,
            TaskState::Failed => UploadStatus::Failed,
            TaskState::Pending | TaskState::Uploading => return None,
        };
        Some(FileResult {
            name: self.file.name.clone(),
            size: self.file.size,
            mime_category: self.category,
            upload_status,
            remote_ref: self.remote_ref.clone(),
            upload_error: self.last_error.as_ref().map(|e| e.message.clone()),
        })
    }

    fn expect_uploading(&self, to: TaskState) -> Result<(), TransferError> {
        if self.state == TaskState::Uploading {
            Ok(())
        } else {
            Err(TransferError::InvalidTransition {
                task: self.id,
                from: self.state,
                to,
            })
        }
    }
}
