//! Batch upload orchestration.
//!
//! Validates every file up front, then drives the valid ones through the
//! transport with bounded concurrency. Failures are classified; transient
//! ones are retried with backoff, an authentication failure aborts the whole
//! batch. Results always come back in submission order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use pashumitra_errors::{
    ErrorCategory, ErrorRecord, Severity, classify, classify_validation, log_record,
};
use pashumitra_notifications::{Notification, NotificationGateway};
use pashumitra_transfer::{
    FileTask, MimeCategory, PreviewGenerator, ProgressCounters, ProgressReporter, RawFile,
    TaskState, TaskUpdate, validate,
};

use crate::context::{BatchContext, INTERRUPTED_MESSAGE};
use crate::retry::{RetryDecision, RetryKind};
use crate::settings::{DispatchMode, UploadSettings};
use crate::transport::{AuthSessionManager, UploadTransport};
use crate::types::{BatchResult, UploadEvent};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

type SharedCallback = dyn Fn(&TaskUpdate, ProgressCounters) + Send + Sync;

/// Runs upload batches against one transport.
pub struct UploadScheduler {
    transport: Arc<dyn UploadTransport>,
    settings: UploadSettings,
    auth: Option<Arc<dyn AuthSessionManager>>,
    notifier: Option<Arc<dyn NotificationGateway>>,
    callbacks: RwLock<Vec<Arc<SharedCallback>>>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
    cancel: CancellationToken,
}

/// Everything one run shares between its task futures.
struct Batch {
    ctx: BatchContext,
    board: TaskBoard,
    reporter: ProgressReporter,
}

/// Index-addressed task slots. Locks are never held across an await.
struct TaskBoard {
    slots: Vec<Mutex<FileTask>>,
}

impl TaskBoard {
    fn new(tasks: Vec<FileTask>) -> Self {
        Self {
            slots: tasks.into_iter().map(Mutex::new).collect(),
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn with<R>(&self, index: usize, f: impl FnOnce(&mut FileTask) -> R) -> R {
        f(&mut *lock(&self.slots[index]))
    }

    fn into_tasks(self) -> Vec<FileTask> {
        self.slots
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect()
    }
}

enum Admission {
    Queued,
    PassedThrough,
    Rejected(ErrorRecord),
}

impl UploadScheduler {
    pub fn new(transport: Arc<dyn UploadTransport>, settings: UploadSettings) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            settings,
            auth: None,
            notifier: None,
            callbacks: RwLock::new(Vec::new()),
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the session owner told about authentication failures.
    pub fn with_auth(mut self, auth: Arc<dyn AuthSessionManager>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets where terminal failures are reported to the user.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Cancelling this token aborts the running batch and every later one.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registers a callback fed every task update of every batch.
    pub fn on_update(&self, callback: impl Fn(&TaskUpdate, ProgressCounters) + Send + Sync + 'static) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// Uploads a batch of files.
    pub async fn run(&self, files: Vec<RawFile>) -> BatchResult {
        self.run_tasks(files.into_iter().map(FileTask::new).collect())
            .await
    }

    /// Runs existing tasks, e.g. from an earlier [`BatchResult`].
    ///
    /// Completed tasks pass through untouched. Failed tasks are attempted
    /// again only while their retry budget lasts; validation failures never.
    pub async fn run_tasks(&self, tasks: Vec<FileTask>) -> BatchResult {
        let total = tasks.len();
        let limit = self.settings.effective_concurrency();
        info!(total, limit, mode = ?self.settings.dispatch, "upload batch started");

        let batch = Batch {
            ctx: BatchContext::new(
                self.cancel.child_token(),
                self.settings.retry_policy(),
                self.settings.history_capacity,
            ),
            board: TaskBoard::new(tasks),
            reporter: self.reporter(total),
        };

        let queue = self.admit(&batch).await;
        if self.settings.generate_previews {
            self.spawn_previews(&batch, &queue);
        }

        match self.settings.dispatch {
            DispatchMode::SlidingWindow => self.dispatch_window(&batch, queue, limit).await,
            DispatchMode::Barrier => self.dispatch_barrier(&batch, &queue, limit).await,
        }

        let summary = batch.reporter.summary();
        info!(
            completed = summary.completed,
            failed = summary.failed,
            total,
            "upload batch finished"
        );

        let Batch { ctx, board, .. } = batch;
        let retries = ctx.retries().entries();
        BatchResult::new(board.into_tasks(), ctx.into_history(), retries, summary)
    }

    fn reporter(&self, total: usize) -> ProgressReporter {
        let reporter = ProgressReporter::new(total);
        for callback in self.callbacks.read().unwrap_or_else(PoisonError::into_inner).iter() {
            let callback = Arc::clone(callback);
            reporter.on_update(Box::new(move |update, counters| callback(update, counters)));
        }

        // Ticks come from inside the transport and cannot wait on the
        // channel; everything else goes through `publish`.
        if self.events_taken() {
            let tx = self.events_tx.clone();
            reporter.on_update(Box::new(move |update, _| {
                if matches!(update, TaskUpdate::Progress { .. }) {
                    send_tick(&tx, update.clone().into());
                }
            }));
        }
        reporter
    }

    /// Whether a receiver was handed out. Fixed for the length of a run,
    /// since taking it needs `&mut self`.
    fn events_taken(&self) -> bool {
        self.events_rx.is_none()
    }

    /// Waits for room in the event channel. Without a receiver, or once it
    /// is dropped, the event goes nowhere.
    async fn emit(&self, event: UploadEvent) {
        if !self.events_taken() {
            return;
        }
        if self.events_tx.send(event).await.is_err() {
            trace!("upload event receiver dropped");
        }
    }

    /// Records an update with the reporter and streams it as an event.
    async fn publish(&self, batch: &Batch, update: TaskUpdate) {
        let Some(counters) = batch.reporter.report(update.clone()) else {
            return;
        };
        let finished = matches!(update, TaskUpdate::Finished { .. });
        self.emit(update.into()).await;
        if finished {
            self.emit(UploadEvent::BatchProgress(counters)).await;
        }
    }

    /// Validates pending tasks and sorts every task into "upload" or "done".
    /// Returns the indices to upload, in submission order.
    async fn admit(&self, batch: &Batch) -> Vec<usize> {
        let validation = self.settings.validation_config();
        let max_retries = self.settings.max_retry_attempts;
        let mut queue = Vec::new();

        for index in 0..batch.board.len() {
            let admission = batch.board.with(index, |task| match task.state() {
                TaskState::Completed => Admission::PassedThrough,
                TaskState::Pending => {
                    let check = validate(task.file(), &validation);
                    if check.is_valid {
                        return Admission::Queued;
                    }
                    let record = classify_validation(&check.violations, &task.error_context());
                    if let Err(e) = task.reject(record.clone()) {
                        warn!(index, error = %e, "could not reject task");
                    }
                    Admission::Rejected(record)
                }
                TaskState::Uploading => {
                    let record = ErrorRecord::terminal(
                        ErrorCategory::Unknown,
                        Severity::Medium,
                        INTERRUPTED_MESSAGE,
                        &task.error_context(),
                    );
                    task.abandon(record);
                    if task.can_retry(max_retries) {
                        Admission::Queued
                    } else {
                        Admission::PassedThrough
                    }
                }
                TaskState::Failed if task.can_retry(max_retries) => Admission::Queued,
                TaskState::Failed => Admission::PassedThrough,
            });

            match admission {
                Admission::Queued => queue.push(index),
                Admission::PassedThrough => {
                    trace!(index, "task passed through");
                    self.finish(batch, index).await;
                }
                Admission::Rejected(record) => {
                    log_record(&record);
                    batch.ctx.record_error(record.clone());
                    self.notify(&record);
                    self.report_state(batch, index).await;
                    self.finish(batch, index).await;
                }
            }
        }

        debug!(queued = queue.len(), total = batch.board.len(), "batch admitted");
        queue
    }

    fn spawn_previews(&self, batch: &Batch, queue: &[usize]) {
        let generator = PreviewGenerator::new(self.settings.max_preview_bytes);
        if !self.events_taken() {
            return;
        }
        for &index in queue {
            let (task_id, file) = batch.board.with(index, |t| (t.id(), t.file().clone()));
            if file.category() != MimeCategory::Image {
                continue;
            }
            let generator = generator.clone();
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                match generator.generate(&file).await {
                    Ok(Some(preview)) => {
                        let event = UploadEvent::Preview {
                            index,
                            task_id,
                            data_url: preview.data_url,
                        };
                        if tx.send(event).await.is_err() {
                            trace!(task = %task_id, "preview dropped, receiver gone");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(task = %task_id, error = %e, "preview generation failed"),
                }
            });
        }
    }

    /// A fixed pool of workers pulling from a shared queue.
    async fn dispatch_window(&self, batch: &Batch, queue: Vec<usize>, limit: usize) {
        let workers = limit.min(queue.len());
        let pending = Mutex::new(VecDeque::from(queue));
        join_all((0..workers).map(|_| async {
            while let Some(index) = next_index(&pending) {
                self.drive_task(batch, index).await;
            }
        }))
        .await;
    }

    /// Groups of `limit` tasks; each group must finish before the next starts.
    async fn dispatch_barrier(&self, batch: &Batch, queue: &[usize], limit: usize) {
        for group in queue.chunks(limit) {
            debug!(size = group.len(), "dispatching upload group");
            join_all(group.iter().map(|&index| self.drive_task(batch, index))).await;
        }
    }

    /// Runs one task to a terminal state, retrying while allowed.
    async fn drive_task(&self, batch: &Batch, index: usize) {
        let max_retries = self.settings.max_retry_attempts;

        loop {
            if batch.ctx.is_cancelled() {
                self.abandon(batch, index).await;
                return;
            }

            let started = batch.board.with(index, |t| {
                t.start_attempt(max_retries)
                    .map(|()| (t.id(), t.file().clone(), t.attempt_count()))
            });
            let (task_id, file, attempt) = match started {
                Ok(started) => started,
                Err(e) => {
                    warn!(index, error = %e, "task cannot start");
                    self.finish(batch, index).await;
                    return;
                }
            };
            self.report_state(batch, index).await;
            debug!(task = %task_id, attempt, name = %file.name, "upload attempt started");

            let on_progress = |percent: u8| {
                let moved = batch
                    .board
                    .with(index, |t| t.set_progress(percent).then(|| t.progress()));
                if let Some(percent) = moved {
                    batch.reporter.report(TaskUpdate::Progress {
                        index,
                        task_id,
                        percent,
                    });
                }
            };

            let outcome = tokio::select! {
                biased;
                _ = batch.ctx.cancel_token().cancelled() => None,
                result = self.transport.upload(&file, &on_progress) => Some(result),
            };
            let Some(outcome) = outcome else {
                debug!(task = %task_id, attempt, "upload attempt dropped on cancel");
                self.abandon(batch, index).await;
                return;
            };

            let failure = match outcome {
                Ok(remote_ref) => {
                    if let Err(e) = batch.board.with(index, |t| t.complete(remote_ref)) {
                        warn!(task = %task_id, error = %e, "could not complete task");
                    }
                    info!(task = %task_id, attempt, name = %file.name, "upload completed");
                    self.report_state(batch, index).await;
                    self.finish(batch, index).await;
                    return;
                }
                Err(failure) => failure,
            };

            let context = batch.board.with(index, |t| t.error_context());
            let record = classify(&failure, &context);
            log_record(&record);
            batch.ctx.record_error(record.clone());
            if let Err(e) = batch.board.with(index, |t| t.fail(record.clone())) {
                warn!(task = %task_id, error = %e, "could not fail task");
            }
            self.report_state(batch, index).await;

            if record.category == ErrorCategory::Auth {
                if batch.ctx.abort_for_auth() {
                    warn!(task = %task_id, "authentication rejected, abandoning batch");
                    if let Some(auth) = &self.auth {
                        auth.clear_session();
                    }
                    self.notify(&record);
                }
                self.finish(batch, index).await;
                return;
            }

            let can_retry = batch.board.with(index, |t| t.can_retry(max_retries));
            if !record.retryable || !can_retry {
                self.notify(&record);
                self.finish(batch, index).await;
                return;
            }

            let kind = if record.is_rate_limited() {
                RetryKind::RateLimited
            } else {
                RetryKind::Backoff
            };
            match batch
                .ctx
                .retries()
                .schedule_retry(&context.operation_key, kind, || async {})
            {
                RetryDecision::Exhausted { attempts } => {
                    let max = batch.ctx.retries().policy().max_attempts;
                    warn!(task = %task_id, attempts, max, category = ?record.category, "retries exhausted");
                    self.notify(&record);
                    self.finish(batch, index).await;
                    return;
                }
                RetryDecision::Scheduled(retry) => {
                    self.emit(UploadEvent::RetryScheduled {
                        index,
                        task_id,
                        attempt: retry.attempt(),
                        delay: retry.delay(),
                        category: record.category,
                    })
                    .await;
                    if retry.wait().await.is_none() {
                        self.abandon(batch, index).await;
                        return;
                    }
                }
            }
        }
    }

    /// Fails a task the batch will not finish. Completed tasks are kept.
    async fn abandon(&self, batch: &Batch, index: usize) {
        let abandoned = batch.board.with(index, |t| {
            if t.state() == TaskState::Completed {
                return false;
            }
            let record = batch.ctx.abandon_record(&t.error_context());
            t.abandon(record);
            true
        });
        if abandoned {
            debug!(index, "task abandoned");
            self.report_state(batch, index).await;
        }
        self.finish(batch, index).await;
    }

    async fn report_state(&self, batch: &Batch, index: usize) {
        let (task_id, state) = batch.board.with(index, |t| (t.id(), t.state()));
        debug!(task = %task_id, ?state, "task state changed");
        self.publish(
            batch,
            TaskUpdate::StateChanged {
                index,
                task_id,
                state,
            },
        )
        .await;
    }

    async fn finish(&self, batch: &Batch, index: usize) {
        match batch.board.with(index, |t| t.result()) {
            Some(result) => self.publish(batch, TaskUpdate::Finished { index, result }).await,
            None => warn!(index, "task left the batch without a final state"),
        }
    }

    fn notify(&self, record: &ErrorRecord) {
        if let Some(notifier) = &self.notifier {
            notifier.notify(Notification::from_record(record));
        }
    }
}

fn next_index(pending: &Mutex<VecDeque<usize>>) -> Option<usize> {
    lock(pending).pop_front()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Progress ticks are the only events that may be dropped on a full channel.
fn send_tick(tx: &mpsc::Sender<UploadEvent>, event: UploadEvent) {
    if let Err(e) = tx.try_send(event) {
        trace!("progress tick dropped: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    use pashumitra_errors::TransportFailure;
    use pashumitra_transfer::RemoteRef;

    use crate::transport::ProgressFn;

    struct InstantTransport;

    impl UploadTransport for InstantTransport {
        fn upload<'a>(
            &'a self,
            file: &'a RawFile,
            progress: ProgressFn<'a>,
        ) -> Pin<Box<dyn Future<Output = Result<RemoteRef, TransportFailure>> + Send + 'a>> {
            Box::pin(async move {
                progress(40);
                progress(30);
                progress(100);
                Ok(RemoteRef {
                    url: format!("mem://{}", file.name),
                    remote_id: file.name.clone(),
                })
            })
        }
    }

    fn scheduler() -> UploadScheduler {
        UploadScheduler::new(Arc::new(InstantTransport), UploadSettings::default())
    }

    fn png(name: &str) -> RawFile {
        RawFile::from_bytes(name, "image/png", b"moo".to_vec())
    }

    fn drain(rx: &mut mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn events_can_be_taken_once() {
        let mut s = scheduler();
        assert!(s.take_events().is_some());
        assert!(s.take_events().is_none());
    }

    #[tokio::test]
    async fn emits_lifecycle_events() {
        let mut s = scheduler();
        let mut rx = s.take_events().unwrap();

        let result = s.run(vec![png("cow.png")]).await;
        assert_eq!(result.completed(), 1);

        let events = drain(&mut rx);
        let states: Vec<TaskState> = events
            .iter()
            .filter_map(|e| match e {
                UploadEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect();
        assert_eq!(states, vec![TaskState::Uploading, TaskState::Completed]);

        // The regressing tick is swallowed.
        let ticks: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                UploadEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![40, 100]);

        assert!(events.contains(&UploadEvent::BatchProgress(ProgressCounters {
            completed: 1,
            failed: 0,
            total: 1,
        })));
    }

    #[tokio::test]
    async fn preview_arrives_on_the_side() {
        let mut s = scheduler();
        let mut rx = s.take_events().unwrap();
        s.run(vec![png("cow.png"), RawFile::from_bytes("moo.wav", "audio/wav", b"RIFF".to_vec())])
            .await;

        // Preview tasks are detached; wait for the one image preview.
        let preview = loop {
            match rx.recv().await {
                Some(UploadEvent::Preview { index, data_url, .. }) => break (index, data_url),
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        };
        assert_eq!(preview, (0, "data:image/png;base64,bW9v".to_string()));
    }

    #[tokio::test]
    async fn previews_can_be_disabled() {
        let settings = UploadSettings {
            generate_previews: false,
            ..Default::default()
        };
        let mut s = UploadScheduler::new(Arc::new(InstantTransport), settings);
        let mut rx = s.take_events().unwrap();
        s.run(vec![png("cow.png")]).await;
        tokio::task::yield_now().await;

        assert!(
            !drain(&mut rx)
                .iter()
                .any(|e| matches!(e, UploadEvent::Preview { .. }))
        );
    }

    #[tokio::test]
    async fn callbacks_see_every_batch() {
        let s = scheduler();
        let finished = Arc::new(Mutex::new(0usize));
        let f = Arc::clone(&finished);
        s.on_update(move |update, _| {
            if matches!(update, TaskUpdate::Finished { .. }) {
                *f.lock().unwrap() += 1;
            }
        });

        s.run(vec![png("a.png"), png("b.png")]).await;
        s.run(vec![png("c.png")]).await;
        assert_eq!(*finished.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_batch() {
        let result = scheduler().run(Vec::new()).await;
        assert!(result.is_empty());
        assert_eq!(result.errors().count(), 0);
    }

    #[test]
    fn next_index_drains_in_order() {
        let pending = Mutex::new(VecDeque::from(vec![3, 1]));
        assert_eq!(next_index(&pending), Some(3));
        assert_eq!(next_index(&pending), Some(1));
        assert_eq!(next_index(&pending), None);
    }
}
