//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use pashumitra_upload::{DispatchMode, UploadSettings};

/// How uploads are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDispatch {
    /// Start the next file as soon as any slot frees up.
    SlidingWindow,
    /// Upload in fixed groups, each waiting for the previous one.
    Barrier,
}

impl From<CliDispatch> for DispatchMode {
    fn from(mode: CliDispatch) -> Self {
        match mode {
            CliDispatch::SlidingWindow => DispatchMode::SlidingWindow,
            CliDispatch::Barrier => DispatchMode::Barrier,
        }
    }
}

/// Upload files into a storage directory, with validation, retries and
/// progress reporting. Prints the batch result as JSON.
#[derive(Debug, Parser)]
#[command(name = "pashumitra-upload", version)]
pub struct Cli {
    /// Files to upload
    #[arg(required = true, value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Destination directory
    #[arg(short = 'd', long = "dest", default_value = "uploads", value_name = "DIR")]
    pub dest: PathBuf,

    /// Settings file (default: ~/.config/pashumitra/upload.toml)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum simultaneous uploads
    #[arg(short = 'j', long = "concurrency")]
    pub concurrency: Option<usize>,

    /// Dispatch strategy
    #[arg(long = "dispatch", value_enum)]
    pub dispatch: Option<CliDispatch>,

    /// Skip image previews
    #[arg(long = "no-previews")]
    pub no_previews: bool,
}

impl Cli {
    /// Applies command-line overrides on top of loaded settings.
    pub fn apply(&self, settings: &mut UploadSettings) {
        if let Some(limit) = self.concurrency {
            settings.concurrency_limit = limit;
        }
        if let Some(mode) = self.dispatch {
            settings.dispatch = mode.into();
        }
        if self.no_previews {
            settings.generate_previews = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_files_and_defaults() {
        let cli = Cli::try_parse_from(["pashumitra-upload", "a.png", "b.wav"]).unwrap();
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.dest, PathBuf::from("uploads"));
        assert!(cli.config.is_none());

        let mut settings = UploadSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings, UploadSettings::default());
    }

    #[test]
    fn requires_a_file() {
        assert!(Cli::try_parse_from(["pashumitra-upload"]).is_err());
    }

    #[test]
    fn overrides_settings() {
        let cli = Cli::try_parse_from([
            "pashumitra-upload",
            "-j",
            "5",
            "--dispatch",
            "barrier",
            "--no-previews",
            "a.png",
        ])
        .unwrap();

        let mut settings = UploadSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.concurrency_limit, 5);
        assert_eq!(settings.dispatch, DispatchMode::Barrier);
        assert!(!settings.generate_previews);
    }
}
