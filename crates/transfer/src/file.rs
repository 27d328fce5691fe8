use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Where a file's bytes live. Owned by the caller; cloning never copies
/// the bytes.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A file on local disk.
    Path(PathBuf),
    /// Bytes already held in memory.
    Memory(Arc<[u8]>),
}

impl FileSource {
    /// Reads the whole source into memory.
    pub async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Path(path) => tokio::fs::read(path).await,
            Self::Memory(bytes) => Ok(bytes.to_vec()),
        }
    }
}

/// A file as submitted by the caller, before validation.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    pub mime_type: String,
    pub source: FileSource,
}

impl RawFile {
    pub fn new(
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        source: FileSource,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            source,
        }
    }

    /// Wraps in-memory bytes; the size is taken from the buffer.
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let bytes: Arc<[u8]> = bytes.into();
        Self::new(name, bytes.len() as u64, mime_type, FileSource::Memory(bytes))
    }

    pub fn category(&self) -> MimeCategory {
        MimeCategory::from_mime(&self.mime_type)
    }
}

/// Coarse file kind, derived from the MIME type prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeCategory {
    Image,
    Audio,
    Video,
    Document,
}

impl MimeCategory {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Self::Image
        } else if mime_type.starts_with("audio/") {
            Self::Audio
        } else if mime_type.starts_with("video/") {
            Self::Video
        } else {
            Self::Document
        }
    }
}

/// Guesses a MIME type from a file extension.
pub fn detect_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("wav") => Some("audio/wav"),
        Some("mp3") => Some("audio/mp3"),
        Some("mp4") => Some("video/mp4"),
        Some("webm") => Some("video/webm"),
        Some("pdf") => Some("application/pdf"),
        Some("txt") => Some("text/plain"),
        _ => None,
    }
}

/// Formats a byte count for display: `0 Bytes`, `1.5 KB`, `50 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".into();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{value:.2}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_from_mime() {
        assert_eq!(MimeCategory::from_mime("image/png"), MimeCategory::Image);
        assert_eq!(MimeCategory::from_mime("audio/wav"), MimeCategory::Audio);
        assert_eq!(MimeCategory::from_mime("video/mp4"), MimeCategory::Video);
        assert_eq!(MimeCategory::from_mime("application/pdf"), MimeCategory::Document);
        assert_eq!(MimeCategory::from_mime(""), MimeCategory::Document);
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(52_428_800), "50 MB");
        assert_eq!(format_file_size(2 * 1024 * 1024 * 1024), "2 GB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024 * 1024), "5120 GB");
    }

    #[test]
    fn detect_known_extensions() {
        assert_eq!(detect_mime_type(Path::new("cow.PNG")), Some("image/png"));
        assert_eq!(detect_mime_type(Path::new("a/b/photo.jpeg")), Some("image/jpeg"));
        assert_eq!(detect_mime_type(Path::new("moo.wav")), Some("audio/wav"));
        assert_eq!(detect_mime_type(Path::new("noext")), None);
        assert_eq!(detect_mime_type(Path::new("archive.zip")), None);
    }

    #[test]
    fn from_bytes_takes_len() {
        let file = RawFile::from_bytes("a.png", "image/png", vec![1u8, 2, 3]);
        assert_eq!(file.size, 3);
        assert_eq!(file.category(), MimeCategory::Image);
    }

    #[tokio::test]
    async fn read_all_from_path_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.bin");
        std::fs::write(&path, b"hello").unwrap();

        let from_path = FileSource::Path(path).read_all().await.unwrap();
        assert_eq!(from_path, b"hello");

        let mem = FileSource::Memory(Arc::from(&b"moo"[..]));
        assert_eq!(mem.read_all().await.unwrap(), b"moo");
    }
}
