//! Collaborator traits the pipeline drives.

use std::future::Future;
use std::pin::Pin;

use pashumitra_errors::TransportFailure;
use pashumitra_transfer::{RawFile, RemoteRef};

/// Progress sink handed to a transport; takes a percentage in `0..=100`.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Moves one file to remote storage.
///
/// Implementations apply their own request timeout and report it as
/// [`TransportFailure::Aborted`]. The returned future may be dropped at any
/// suspension point when the batch is cancelled.
pub trait UploadTransport: Send + Sync {
    fn upload<'a>(
        &'a self,
        file: &'a RawFile,
        progress: ProgressFn<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<RemoteRef, TransportFailure>> + Send + 'a>>;
}

/// Owner of the user's session credentials.
pub trait AuthSessionManager: Send + Sync {
    /// Drops stored credentials and sends the user to sign in again.
    fn clear_session(&self);
}
