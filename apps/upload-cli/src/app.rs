//! Upload run: builds the batch, wires the pipeline and reports the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pashumitra_notifications::{NotificationKind, SharedToastQueue};
use pashumitra_transfer::{FileSource, RawFile, detect_mime_type, format_file_size};
use pashumitra_upload::{LocalDirTransport, UploadEvent, UploadScheduler, UploadSettings};

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";

/// Uploads `files` into `dest`. Returns `true` when every file completed.
pub async fn run(files: Vec<PathBuf>, dest: PathBuf, settings: UploadSettings) -> anyhow::Result<bool> {
    let mut batch = Vec::with_capacity(files.len());
    for path in &files {
        batch.push(raw_file(path).await?);
    }

    let transport = LocalDirTransport::new(dest);
    transport
        .prepare()
        .await
        .with_context(|| format!("creating {}", transport.dest().display()))?;

    let toasts = Arc::new(SharedToastQueue::new());
    let mut scheduler = UploadScheduler::new(Arc::new(transport), settings)
        .with_notifier(Arc::clone(&toasts) as _);

    let logger = scheduler
        .take_events()
        .map(|events| tokio::spawn(log_events(events)));

    let cancel = scheduler.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling uploads");
            cancel.cancel();
        }
    });

    let result = scheduler.run(batch).await;

    // Dropping the scheduler closes the channel once previews are sent.
    drop(scheduler);
    if let Some(logger) = logger {
        let finished = logger.await.context("event logger stopped")?;
        debug!(finished, "event log drained");
    }

    for toast in toasts.snapshot() {
        match toast.kind {
            NotificationKind::Error | NotificationKind::Warning => warn!("{}", toast.message),
            NotificationKind::Success | NotificationKind::Info => info!("{}", toast.message),
        }
    }

    let stats = result.error_stats();
    if stats.total > 0 {
        debug!(errors = stats.total, by_category = ?stats.by_category, "error summary");
    }

    println!("{}", result.to_json()?);
    info!(
        completed = result.completed(),
        failed = result.failed(),
        "upload finished"
    );
    Ok(result.failed() == 0)
}

/// Describes a local file for the pipeline. The MIME type comes from the
/// extension; unknown extensions are left for validation to reject.
async fn raw_file(path: &Path) -> anyhow::Result<RawFile> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    anyhow::ensure!(metadata.is_file(), "{} is not a regular file", path.display());

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime_type = detect_mime_type(path).unwrap_or(FALLBACK_MIME_TYPE);
    debug!(name = %name, mime = mime_type, size = %format_file_size(metadata.len()), "file queued");

    Ok(RawFile::new(
        name,
        metadata.len(),
        mime_type,
        FileSource::Path(path.to_path_buf()),
    ))
}

/// Logs events until the channel closes. Returns the number of finished files.
async fn log_events(mut events: mpsc::Receiver<UploadEvent>) -> usize {
    let mut finished = 0;
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::RetryScheduled {
                index,
                attempt,
                delay,
                category,
                ..
            } => info!(
                index,
                attempt,
                delay_ms = delay.as_millis() as u64,
                category = %category,
                "retrying upload"
            ),
            UploadEvent::TaskFinished { result, .. } => {
                finished += 1;
                info!(
                    name = %result.name,
                    status = ?result.upload_status,
                    "file finished"
                )
            }
            UploadEvent::BatchProgress(counters) => info!(
                done = counters.completed + counters.failed,
                total = counters.total,
                "batch progress {:.0}%",
                counters.ratio() * 100.0
            ),
            UploadEvent::Preview { index, data_url, .. } => {
                debug!(index, bytes = data_url.len(), "preview ready")
            }
            UploadEvent::StateChanged { .. } | UploadEvent::Progress { .. } => {}
        }
    }
    finished
}
