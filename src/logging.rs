//! Tracing setup for the CLI.
//!
//! Diagnostics go to stderr so stdout carries only answers and progress lines. A second,
//! ANSI-free layer appends to `RESUMELENS_LOG_FILE`, or `logs/resumelens.log` when unset.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log file used when `RESUMELENS_LOG_FILE` is unset.
pub const DEFAULT_LOG_FILE: &str = "logs/resumelens.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let file_layer = open_log_file(&log_file_path()).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .compact()
    });

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn log_file_path() -> PathBuf {
    std::env::var("RESUMELENS_LOG_FILE")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

/// Open `path` for appending behind a non-blocking writer, creating parent directories.
///
/// Returns `None` (after a note on stderr) when the file cannot be opened; logging then
/// continues on stderr only.
fn open_log_file(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty())
        && let Err(err) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create log directory {}: {err}", parent.display());
        return None;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = FILE_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_nested_log_file() {
        let dir = std::env::temp_dir().join(format!("resumelens-log-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("run.log");

        assert!(open_log_file(&path).is_some());
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
