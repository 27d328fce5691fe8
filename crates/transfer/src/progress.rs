use std::sync::{Mutex, PoisonError, RwLock};

use tracing::trace;

use crate::task::{FileResult, TaskId, TaskState, UploadStatus};

/// An observation about one task, fed to [`ProgressReporter::report`].
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
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
    /// The task reached its final state for this batch.
    Finished { index: usize, result: FileResult },
}

/// Batch-level counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounters {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl ProgressCounters {
    /// Share of tasks that finished, completed or failed, in `[0.0, 1.0]`.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed + self.failed) as f64 / self.total as f64
    }
}

/// Snapshot returned by [`ProgressReporter::summary`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
    /// Finished results so far, in submission order.
    pub results: Vec<FileResult>,
}

/// Callback invoked after every update.
pub type UpdateCallback = Box<dyn Fn(&TaskUpdate, ProgressCounters) + Send + Sync>;

/// Aggregates task updates for one batch and fans them out to callbacks.
///
/// Purely observational: it never touches task state itself.
pub struct ProgressReporter {
    inner: Mutex<ReporterInner>,
    callbacks: RwLock<Vec<UpdateCallback>>,
}

struct ReporterInner {
    states: Vec<TaskState>,
    progress: Vec<u8>,
    results: Vec<Option<FileResult>>,
    completed: usize,
    failed: usize,
    uploading: usize,
    peak_uploading: usize,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            inner: Mutex::new(ReporterInner {
                states: vec![TaskState::Pending; total],
                progress: vec![0; total],
                results: vec![None; total],
                completed: 0,
                failed: 0,
                uploading: 0,
                peak_uploading: 0,
            }),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Registers an update callback.
    pub fn on_update(&self, callback: UpdateCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }

    /// Records an update and notifies callbacks, returning the counters the
    /// callbacks saw. Updates for out-of-range indices are dropped.
    pub fn report(&self, update: TaskUpdate) -> Option<ProgressCounters> {
        let counters = {
            let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if !s.apply(&update) {
                return None;
            }
            s.counters()
        };

        let callbacks = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
        for cb in callbacks.iter() {
            cb(&update, counters);
        }
        Some(counters)
    }

    pub fn counters(&self) -> ProgressCounters {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counters()
    }

    pub fn summary(&self) -> BatchSummary {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        BatchSummary {
            completed: s.completed,
            failed: s.failed,
            total: s.states.len(),
            results: s.results.iter().flatten().cloned().collect(),
        }
    }

    /// Last reported percentage for a task.
    pub fn progress_of(&self, index: usize) -> Option<u8> {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.progress.get(index).copied()
    }

    /// Tasks currently uploading.
    pub fn uploading(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).uploading
    }

    /// Highest number of tasks seen uploading at once.
    pub fn peak_uploading(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peak_uploading
    }
}

impl ReporterInner {
    fn apply(&mut self, update: &TaskUpdate) -> bool {
        match update {
            TaskUpdate::StateChanged { index, state, .. } => {
                let Some(prev) = self.states.get_mut(*index) else {
                    return false;
                };
                let was_uploading = *prev == TaskState::Uploading;
                *prev = *state;
                match (was_uploading, *state == TaskState::Uploading) {
                    (false, true) => {
                        self.uploading += 1;
                        self.peak_uploading = self.peak_uploading.max(self.uploading);
                        self.progress[*index] = 0;
                    }
                    (true, false) => self.uploading -= 1,
                    _ => {}
                }
                true
            }
            TaskUpdate::Progress { index, percent, .. } => {
                let Some(p) = self.progress.get_mut(*index) else {
                    return false;
                };
                trace!(index, percent, "task progress");
                *p = (*percent).min(100);
                true
            }
            TaskUpdate::Finished { index, result } => {
                let Some(slot) = self.results.get_mut(*index) else {
                    return false;
                };
                if slot.is_some() {
                    return false;
                }
                match result.upload_status {
                    UploadStatus::Completed => self.completed += 1,
                    UploadStatus::Failed => self.failed += 1,
                }
                *slot = Some(result.clone());
                true
            }
        }
    }

    fn counters(&self) -> ProgressCounters {
        ProgressCounters {
            completed: self.completed,
            failed: self.failed,
            total: self.states.len(),
        }
    }
}
