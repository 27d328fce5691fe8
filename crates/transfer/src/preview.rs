use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::TransferError;
use crate::file::{MimeCategory, RawFile};

/// Images above this size get no inline preview.
pub const DEFAULT_MAX_PREVIEW_BYTES: u64 = 5 * 1024 * 1024;

/// A lightweight preview for display next to an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
}

/// Builds inline previews for image files.
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    max_bytes: u64,
}

impl PreviewGenerator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Reads an image and encodes it as a data URL.
    ///
    /// Returns `Ok(None)` for non-images and for images over the size cap.
    pub async fn generate(&self, file: &RawFile) -> Result<Option<Preview>, TransferError> {
        if file.category() != MimeCategory::Image || file.size > self.max_bytes {
            return Ok(None);
        }

        let bytes = file.source.read_all().await?;
        if bytes.len() as u64 > self.max_bytes {
            return Ok(None);
        }

        let data_url = format!("data:{};base64,{}", file.mime_type, STANDARD.encode(&bytes));
        Ok(Some(Preview { data_url }))
    }
}

impl Default for PreviewGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PREVIEW_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileSource;
    use std::path::PathBuf;

    #[tokio::test]
    async fn image_gets_data_url() {
        let file = RawFile::from_bytes("cow.png", "image/png", b"moo".to_vec());
        let preview = PreviewGenerator::default().generate(&file).await.unwrap().unwrap();
        assert_eq!(preview.data_url, "data:image/png;base64,bW9v");
    }

    #[tokio::test]
    async fn audio_has_no_preview() {
        let file = RawFile::from_bytes("moo.wav", "audio/wav", b"RIFF".to_vec());
        assert!(PreviewGenerator::default().generate(&file).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_image_is_skipped_without_reading() {
        // The path does not exist; a read attempt would fail.
        let file = RawFile::new(
            "big.png",
            10_000,
            "image/png",
            FileSource::Path(PathBuf::from("/nonexistent/big.png")),
        );
        let preview = PreviewGenerator::new(1_000).generate(&file).await.unwrap();
        assert!(preview.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let file = RawFile::new(
            "gone.png",
            10,
            "image/png",
            FileSource::Path(PathBuf::from("/nonexistent/gone.png")),
        );
        let err = PreviewGenerator::default().generate(&file).await.unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[tokio::test]
    async fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goat.jpg");
        std::fs::write(&path, [0xffu8, 0xd8, 0xff]).unwrap();
        let file = RawFile::new("goat.jpg", 3, "image/jpeg", FileSource::Path(path));
        let preview = PreviewGenerator::default().generate(&file).await.unwrap().unwrap();
        assert!(preview.data_url.starts_with("data:image/jpeg;base64,"));
    }
}
