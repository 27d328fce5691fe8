//! Upload pipeline settings.
//!
//! Stored as TOML. Every field has a default, so an empty file (or no file)
//! yields a working configuration. Two environment variables can override
//! the validation limits:
//! - `PASHUMITRA_MAX_FILE_SIZE`: integer bytes
//! - `PASHUMITRA_ALLOWED_FILE_TYPES`: comma-separated MIME types

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pashumitra_errors::DEFAULT_HISTORY_CAPACITY;
use pashumitra_transfer::{DEFAULT_MAX_PREVIEW_BYTES, DEFAULT_MAX_SIZE_BYTES, ValidationConfig};

use crate::retry::RetryPolicy;

pub const ENV_MAX_FILE_SIZE: &str = "PASHUMITRA_MAX_FILE_SIZE";
pub const ENV_ALLOWED_FILE_TYPES: &str = "PASHUMITRA_ALLOWED_FILE_TYPES";

/// Errors loading or checking [`UploadSettings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// How valid tasks are fed to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// A fixed pool of workers; a slot frees as soon as its task finishes.
    #[default]
    SlidingWindow,
    /// Fixed-size groups; the next group waits for the whole previous one.
    Barrier,
}

/// Upload pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Largest accepted file, in bytes.
    pub max_size_bytes: u64,
    /// Exact MIME types accepted by validation.
    pub allowed_mime_types: Vec<String>,
    /// Maximum simultaneous uploads. 0 is treated as 1.
    pub concurrency_limit: usize,
    /// Retries scheduled per file after the first transport call.
    pub max_retry_attempts: u32,
    /// Base of the exponential backoff, in milliseconds.
    pub backoff_base_ms: u64,
    /// Fixed wait after a 429 response, in milliseconds.
    pub rate_limit_delay_ms: u64,
    /// Capacity of the per-batch diagnostic error history.
    pub history_capacity: usize,
    pub dispatch: DispatchMode,
    pub generate_previews: bool,
    pub max_preview_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        let validation = ValidationConfig::default();
        Self {
            max_size_bytes: DEFAULT_MAX_SIZE_BYTES,
            allowed_mime_types: validation.allowed_mime_types,
            concurrency_limit: 3,
            max_retry_attempts: 3,
            backoff_base_ms: 1000,
            rate_limit_delay_ms: 30_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            dispatch: DispatchMode::default(),
            generate_previews: true,
            max_preview_bytes: DEFAULT_MAX_PREVIEW_BYTES,
        }
    }
}

impl UploadSettings {
    /// Parses settings from TOML text and checks them.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Loads settings from a TOML file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Applies the `PASHUMITRA_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(
            std::env::var(ENV_MAX_FILE_SIZE).ok(),
            std::env::var(ENV_ALLOWED_FILE_TYPES).ok(),
        );
        self
    }

    /// Applies raw override values. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, max_size: Option<String>, allowed_types: Option<String>) {
        if let Some(raw) = max_size {
            match raw.trim().parse::<u64>() {
                Ok(bytes) if bytes > 0 => self.max_size_bytes = bytes,
                _ => warn!(var = ENV_MAX_FILE_SIZE, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = allowed_types {
            let types: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
            if types.is_empty() {
                warn!(var = ENV_ALLOWED_FILE_TYPES, value = %raw, "ignoring invalid override");
            } else {
                self.allowed_mime_types = types;
            }
        }
    }

    /// Rejects settings no batch could run with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_size_bytes must be greater than zero".into(),
            ));
        }
        if self.allowed_mime_types.is_empty() {
            return Err(ConfigError::Invalid(
                "allowed_mime_types must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            max_size_bytes: self.max_size_bytes,
            allowed_mime_types: self.allowed_mime_types.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retry_attempts,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            rate_limit_delay: Duration::from_millis(self.rate_limit_delay_ms),
        }
    }

    /// The concurrency limit, never below 1.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency_limit.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = UploadSettings::default();
        assert_eq!(s.max_size_bytes, 52_428_800);
        assert_eq!(s.concurrency_limit, 3);
        assert_eq!(s.max_retry_attempts, 3);
        assert_eq!(s.history_capacity, 50);
        assert_eq!(s.dispatch, DispatchMode::SlidingWindow);
        assert!(s.allowed_mime_types.iter().any(|t| t == "audio/mp3"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let s = UploadSettings::from_toml_str(
            "concurrency_limit = 5\ndispatch = \"barrier\"\n",
        )
        .unwrap();
        assert_eq!(s.concurrency_limit, 5);
        assert_eq!(s.dispatch, DispatchMode::Barrier);
        assert_eq!(s.backoff_base_ms, 1000);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(UploadSettings::from_toml_str("").unwrap(), UploadSettings::default());
    }

    #[test]
    fn rejects_bad_values() {
        let err = UploadSettings::from_toml_str("max_size_bytes = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = UploadSettings::from_toml_str("allowed_mime_types = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = UploadSettings::from_toml_str("concurrency_limit = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = UploadSettings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(s, UploadSettings::default());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.toml");
        std::fs::write(&path, "max_retry_attempts = 1\ngenerate_previews = false\n").unwrap();

        let s = UploadSettings::load(&path).unwrap();
        assert_eq!(s.max_retry_attempts, 1);
        assert!(!s.generate_previews);
    }

    #[test]
    fn overrides_apply_when_valid() {
        let mut s = UploadSettings::default();
        s.apply_overrides(Some("1024".into()), Some("image/png, image/gif,".into()));
        assert_eq!(s.max_size_bytes, 1024);
        assert_eq!(s.allowed_mime_types, vec!["image/png", "image/gif"]);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut s = UploadSettings::default();
        s.apply_overrides(Some("fifty".into()), Some(" , ".into()));
        assert_eq!(s, UploadSettings::default());
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let s = UploadSettings {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert_eq!(s.effective_concurrency(), 1);
    }

    #[test]
    fn retry_policy_from_settings() {
        let policy = UploadSettings::default().retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.rate_limit_delay, Duration::from_secs(30));
    }
}
