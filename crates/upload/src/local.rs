//! A transport that stores uploads in a local directory.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use pashumitra_errors::TransportFailure;
use pashumitra_transfer::{RawFile, RemoteRef};

use crate::error::UploadError;
use crate::transport::{ProgressFn, UploadTransport};

/// Bytes written between progress reports.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Copies each file into `dest` as `<remote id>-<file name>`, staged under a
/// hidden `.part` name until the copy is complete.
#[derive(Debug, Clone)]
pub struct LocalDirTransport {
    dest: PathBuf,
}

impl LocalDirTransport {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self { dest: dest.into() }
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Creates the destination directory if needed.
    pub async fn prepare(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dest).await?;
        Ok(())
    }

    async fn store(&self, file: &RawFile, progress: ProgressFn<'_>) -> Result<RemoteRef, TransportFailure> {
        // Source read failures are the caller's and never retried.
        let bytes = file
            .source
            .read_all()
            .await
            .map_err(|e| TransportFailure::Other(format!("cannot read {}: {e}", file.name)))?;
        let remote_id = uuid::Uuid::new_v4().simple().to_string();
        let target = self.dest.join(format!("{remote_id}-{}", stored_name(&file.name)));

        let part = PartFile::new(self.dest.join(format!(".{remote_id}.part")));
        write_part(&part.path, file, &bytes, progress)
            .await
            .map_err(dest_failure)?;
        tokio::fs::rename(&part.path, &target)
            .await
            .map_err(dest_failure)?;
        part.keep();

        let absolute = std::path::absolute(&target).unwrap_or(target);
        debug!(name = %file.name, path = %absolute.display(), "file stored");
        Ok(RemoteRef {
            url: format!("file://{}", absolute.display()),
            remote_id,
        })
    }
}

impl UploadTransport for LocalDirTransport {
    fn upload<'a>(
        &'a self,
        file: &'a RawFile,
        progress: ProgressFn<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteRef, TransportFailure>> + Send + 'a>> {
        Box::pin(self.store(file, progress))
    }
}

/// Copies `bytes` to `path` in chunks, reporting progress after each one.
async fn write_part(
    path: &Path,
    file: &RawFile,
    bytes: &[u8],
    progress: ProgressFn<'_>,
) -> io::Result<()> {
    let mut out = tokio::fs::File::create(path).await?;
    let total = bytes.len();
    let mut written = 0usize;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        out.write_all(chunk).await?;
        written += chunk.len();
        let percent = (written * 100 / total) as u8;
        trace!(name = %file.name, written, total, "chunk written");
        progress(percent);
        tokio::task::yield_now().await;
    }
    out.flush().await?;
    if total == 0 {
        progress(100);
    }
    Ok(())
}

fn dest_failure(e: io::Error) -> TransportFailure {
    TransportFailure::NoResponse(e.to_string())
}

/// An in-progress copy. Removed on drop unless [`PartFile::keep`] was
/// called, so failed or abandoned uploads leave nothing in the store.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => trace!(path = %self.path.display(), "partial upload removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove partial upload"),
        }
    }
}

/// The last path component of a caller-supplied name.
fn stored_name(name: &str) -> &str {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload")
}
