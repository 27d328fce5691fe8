//! Settings file location.
//!
//! - Linux/macOS: `~/.config/pashumitra/upload.toml`
//! - Windows: `%APPDATA%/pashumitra/upload.toml`

use std::path::{Path, PathBuf};

use pashumitra_upload::UploadSettings;

/// Loads settings from `explicit` or the default location, then applies
/// environment overrides.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<UploadSettings> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_path(),
    };
    let settings = UploadSettings::load(&path)?.with_env_overrides();
    tracing::debug!(path = %path.display(), "settings resolved");
    Ok(settings)
}

/// Returns the platform-specific settings file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| "C:\\".into());
        PathBuf::from(appdata).join("pashumitra").join("upload.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("pashumitra")
            .join("upload.toml")
    }
}
