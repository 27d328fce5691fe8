//! Upload pipeline error types.

use crate::settings::ConfigError;

/// Errors produced around an upload batch.
///
/// Per-file failures are not errors: they end up as an [`ErrorRecord`] on
/// the failed task.
///
/// [`ErrorRecord`]: pashumitra_errors::ErrorRecord
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transfer error: {0}")]
    Transfer(#[from] pashumitra_transfer::TransferError),
}
