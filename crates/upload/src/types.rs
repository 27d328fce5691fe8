//! Upload events and batch results.

use std::time::Duration;

use pashumitra_errors::{ErrorCategory, ErrorHistory, ErrorRecord, ErrorStats};
use pashumitra_transfer::{
    BatchSummary, FileResult, FileTask, ProgressCounters, TaskId, TaskState, TaskUpdate,
    UploadStatus,
};

use crate::error::UploadError;
use crate::retry::RetryEntry;

/// Events emitted while a batch runs. `index` is the task's position in
/// the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// Inline preview for an image, produced alongside the upload.
    Preview {
        index: usize,
        task_id: TaskId,
        data_url: String,
    },
    StateChanged {
        index: usize,
        task_id: TaskId,
        state: TaskState,
    },
    Progress {
        index: usize,
        task_id: TaskId,
        percent: u8,
    },
    RetryScheduled {
        index: usize,
        task_id: TaskId,
        attempt: u32,
        delay: Duration,
        category: ErrorCategory,
    },
    TaskFinished {
        index: usize,
        result: FileResult,
    },
    /// Sent after every finished task.
    BatchProgress(ProgressCounters),
}

impl From<TaskUpdate> for UploadEvent {
    fn from(update: TaskUpdate) -> Self {
        match update {
            TaskUpdate::StateChanged {
                index,
                task_id,
                state,
            } => Self::StateChanged {
                index,
                task_id,
                state,
            },
            TaskUpdate::Progress {
                index,
                task_id,
                percent,
            } => Self::Progress {
                index,
                task_id,
                percent,
            },
            TaskUpdate::Finished { index, result } => Self::TaskFinished { index, result },
        }
    }
}

/// Outcome of a batch: every task in submission order, all terminal.
#[derive(Debug)]
pub struct BatchResult {
    tasks: Vec<FileTask>,
    history: ErrorHistory,
    retries: Vec<RetryEntry>,
    summary: BatchSummary,
}

impl BatchResult {
    pub(crate) fn new(
        tasks: Vec<FileTask>,
        history: ErrorHistory,
        retries: Vec<RetryEntry>,
        summary: BatchSummary,
    ) -> Self {
        Self {
            tasks,
            history,
            retries,
            summary,
        }
    }

    pub fn tasks(&self) -> &[FileTask] {
        &self.tasks
    }

    /// Hands the tasks back, e.g. to resubmit them.
    pub fn into_tasks(self) -> Vec<FileTask> {
        self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Caller-facing entries, one per submitted file.
    pub fn entries(&self) -> Vec<FileResult> {
        self.tasks.iter().filter_map(FileTask::result).collect()
    }

    pub fn completed(&self) -> usize {
        self.count(UploadStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(UploadStatus::Failed)
    }

    /// Errors classified during the batch, newest first.
    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.history.iter()
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.history.stats()
    }

    /// Retry bookkeeping, ordered by operation key.
    pub fn retries(&self) -> &[RetryEntry] {
        &self.retries
    }

    /// What the progress reporter saw: counters plus every result that
    /// reached a final state, in submission order.
    pub fn summary(&self) -> &BatchSummary {
        &self.summary
    }

    /// The entries as a JSON array.
    pub fn to_json(&self) -> Result<String, UploadError> {
        Ok(serde_json::to_string_pretty(&self.entries())?)
    }

    fn count(&self, status: UploadStatus) -> usize {
        self.tasks
            .iter()
            .filter_map(FileTask::result)
            .filter(|r| r.upload_status == status)
            .count()
    }
}
