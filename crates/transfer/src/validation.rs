use serde::{Deserialize, Serialize};

use crate::file::{RawFile, format_file_size};

/// Default upload size limit: 50 MiB.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 52_428_800;

/// Size and type constraints checked before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub max_size_bytes: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

pub(crate) fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/png", "image/jpg", "audio/wav", "audio/mp3"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Outcome of [`validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<String>,
}

/// Checks a file against the configured constraints.
///
/// Rejects:
/// - Files larger than `max_size_bytes` (zero-byte files are fine)
/// - MIME types missing from `allowed_mime_types`, including unknown or
///   empty types
///
/// Every violation is reported, not just the first.
pub fn validate(file: &RawFile, config: &ValidationConfig) -> ValidationResult {
    let mut violations = Vec::new();

    if file.size > config.max_size_bytes {
        violations.push(format!(
            "File size must be less than {}",
            format_file_size(config.max_size_bytes)
        ));
    }

    if !config.allowed_mime_types.iter().any(|t| t == &file.mime_type) {
        violations.push(format!(
            "File type {} is not allowed. Allowed types: {}",
            file.mime_type,
            config.allowed_mime_types.join(", ")
        ));
    }

    ValidationResult {
        is_valid: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FileSource;
    use std::path::PathBuf;

    fn file(size: u64, mime: &str) -> RawFile {
        RawFile::new("sample", size, mime, FileSource::Path(PathBuf::from("/dev/null")))
    }

    #[test]
    fn accepts_allowed_file() {
        let result = validate(&file(2 * 1024 * 1024, "image/png"), &ValidationConfig::default());
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn accepts_zero_byte_file() {
        assert!(validate(&file(0, "audio/wav"), &ValidationConfig::default()).is_valid);
    }

    #[test]
    fn accepts_exactly_max_size() {
        let result = validate(&file(DEFAULT_MAX_SIZE_BYTES, "image/jpeg"), &ValidationConfig::default());
        assert!(result.is_valid);
    }

    #[test]
    fn rejects_oversized_file() {
        let result = validate(&file(60 * 1024 * 1024, "image/png"), &ValidationConfig::default());
        assert!(!result.is_valid);
        assert_eq!(result.violations, vec!["File size must be less than 50 MB"]);
    }

    #[test]
    fn rejects_unknown_type() {
        let result = validate(&file(10, "application/x-unknown"), &ValidationConfig::default());
        assert!(!result.is_valid);
        assert!(result.violations[0].starts_with("File type application/x-unknown is not allowed"));
        assert!(result.violations[0].contains("image/jpeg, image/png"));
    }

    #[test]
    fn rejects_empty_type() {
        assert!(!validate(&file(10, ""), &ValidationConfig::default()).is_valid);
    }

    #[test]
    fn reports_every_violation() {
        let result = validate(&file(u64::MAX, "text/plain"), &ValidationConfig::default());
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn custom_limits() {
        let config = ValidationConfig {
            max_size_bytes: 1024,
            allowed_mime_types: vec!["video/mp4".into()],
        };
        assert!(validate(&file(1024, "video/mp4"), &config).is_valid);
        let result = validate(&file(1025, "video/mp4"), &config);
        assert_eq!(result.violations, vec!["File size must be less than 1 KB"]);
    }
}
