//! Pashumitra upload CLI entry point.

mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Exit status when at least one file failed.
const EXIT_PARTIAL_FAILURE: i32 = 2;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize structured logging on stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pashumitra=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        files = cli.files.len(),
        "starting Pashumitra upload"
    );

    let mut settings = config::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    tracing::info!(
        concurrency = settings.effective_concurrency(),
        dispatch = ?settings.dispatch,
        max_size_bytes = settings.max_size_bytes,
        "settings loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let all_completed = rt.block_on(app::run(cli.files, cli.dest, settings))?;

    if !all_completed {
        std::process::exit(EXIT_PARTIAL_FAILURE);
    }
    Ok(())
}
